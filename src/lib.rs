//! gcprov
//!
//! Declarative lifecycle management for Cloud SQL databases and BigQuery
//! routines over the GCP REST APIs.

pub mod config;
pub mod error;
pub mod gcp;
pub mod mutex;
pub mod provider;
pub mod resource;

pub use error::{ProviderError, Result};
pub use provider::ProviderContext;
