//! Resource lifecycle management
//!
//! Each managed resource type maps a typed configuration onto a GCP REST API
//! and drives it through `absent → present → absent` with create, read,
//! update, delete and import.
//!
//! # Architecture
//!
//! - [`registry`] - Resource schemas (fields, timeouts, import formats) from embedded JSON
//! - [`identity`] - Identity templates and import id matching
//! - [`field`] - Field codecs and the mutation request builder
//! - [`plan`] - Classifies desired configuration against current state
//! - [`sql_database`] - Cloud SQL database orchestrators
//! - [`bigquery_routine`] - BigQuery routine orchestrators
//! - [`standard_sql`] - Nested SQL data types of routine arguments and results
//! - `wire_enum` - API enumerations that tolerate values added server-side
//! - [`dispatch`] - Manifest parsing and per-kind dispatch
//!
//! # Example
//!
//! ```ignore
//! use gcprov::resource::sql_database::{self, SqlDatabaseConfig};
//!
//! async fn create_orders(ctx: &gcprov::ProviderContext) -> gcprov::Result<()> {
//!     let mut db = sql_database::new(SqlDatabaseConfig {
//!         instance: "prod1".to_string(),
//!         name: "orders".to_string(),
//!         ..Default::default()
//!     })?;
//!     sql_database::create(ctx, &mut db).await
//! }
//! ```

pub mod bigquery_routine;
pub mod dispatch;
pub mod field;
pub mod identity;
pub mod plan;
pub mod registry;
pub mod sql_database;
pub mod standard_sql;
mod wire_enum;

use crate::error::{ProviderError, Result};
use crate::gcp::operation::{wait_for_operation, Operation};
use crate::provider::ProviderContext;
use registry::{get_resource, ResourceDef, Timeouts};
use serde_json::Value;
use std::time::Duration;

pub use registry::get_all_resource_keys;

/// Local view of one resource instance: what the user asked for, what was
/// last read back, and the identity when the resource exists
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceData<C, S> {
    /// Canonical identity; `None` while the resource is absent
    pub id: Option<String>,
    pub config: C,
    pub state: S,
    pub timeouts: Timeouts,
}

impl<C, S: Default> ResourceData<C, S> {
    pub fn new(config: C, timeouts: Timeouts) -> Self {
        Self {
            id: None,
            config,
            state: S::default(),
            timeouts,
        }
    }

    pub fn is_present(&self) -> bool {
        self.id.is_some()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Forget the remote object
    pub fn mark_absent(&mut self) {
        self.id = None;
        self.state = S::default();
    }

    /// Identity of a resource that must exist
    pub fn require_id(&self) -> Result<String> {
        self.id
            .clone()
            .ok_or_else(|| ProviderError::MissingValue("id".to_string()))
    }
}

/// Schema of a registered resource kind
pub fn schema(kind: &str) -> Result<&'static ResourceDef> {
    get_resource(kind).ok_or_else(|| ProviderError::Manifest(format!("unknown resource kind {kind:?}")))
}

/// Finish a mutating call: operation handles are polled to completion,
/// anything else already is the final result
pub(crate) async fn wait_if_operation(
    ctx: &ProviderContext,
    response: &Value,
    project: &str,
    action: &str,
    timeout: Duration,
) -> Result<()> {
    if !Operation::is_operation(response) {
        return Ok(());
    }
    let op = Operation::from_response(response)?;
    wait_for_operation(&ctx.client, &op, project, action, timeout, &ctx.poll).await
}
