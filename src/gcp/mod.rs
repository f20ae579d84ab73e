//! GCP API interaction module
//!
//! # Module Structure
//!
//! - [`auth`] - Access tokens from a static token or Application Default Credentials
//! - [`client`] - Main GCP client and API URL builders
//! - [`http`] - HTTP utilities for REST API calls
//! - [`operation`] - Cloud SQL long-running operation polling
//!
//! # Example
//!
//! ```ignore
//! use gcprov::gcp::client::{ApiEndpoints, GcpClient};
//!
//! async fn example() -> gcprov::Result<()> {
//!     let client = GcpClient::new("my-project", ApiEndpoints::default()).await?;
//!     let db = client
//!         .get(&client.sql_url("projects/my-project/instances/prod1/databases/orders"))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod operation;
