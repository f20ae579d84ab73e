//! Provider Errors
//!
//! Every fallible operation in the library returns [`ProviderError`]. The
//! variants fall into four groups: configuration problems caught before any
//! remote call, remote API failures, failed long-running operations and
//! operation timeouts.

use std::time::Duration;
use thiserror::Error;

/// Library result alias
pub type Result<T, E = ProviderError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// An identity string did not have the canonical shape
    #[error("invalid {kind} id {id:?}, expected {expected}")]
    InvalidId {
        kind: &'static str,
        id: String,
        expected: &'static str,
    },

    /// An import id matched none of the accepted formats
    #[error("import id {id:?} doesn't match any of the accepted formats {formats:?}")]
    ImportMismatch { id: String, formats: Vec<String> },

    /// A value needed to build a path or identity could not be resolved
    #[error("no value for {0}; set it in the configuration or provider defaults")]
    MissingValue(String),

    /// A field expander rejected a configured value
    #[error("invalid value for {field}: {reason}")]
    Expand { field: String, reason: String },

    /// An API response carried a field we couldn't map back
    #[error("unexpected value for {field} in API response: {reason}")]
    Flatten { field: String, reason: String },

    /// A manifest could not be parsed or referenced an unknown resource kind
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// Non-success response from the remote API
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never produced a response
    #[error("failed to send request: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the JSON we expected
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// No access token could be obtained
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A long-running operation finished with an error
    #[error("error waiting for {action}: {reason}")]
    OperationFailed { action: String, reason: String },

    /// A long-running operation did not finish in time; remote state is unknown
    #[error("timed out after {timeout:?} waiting for {action}")]
    OperationTimeout { action: String, timeout: Duration },
}

impl ProviderError {
    /// True when the remote API reported that the resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Build an expansion error for a field
    pub fn expand(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Expand {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Build a flattening error for a field
    pub fn flatten(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Flatten {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
