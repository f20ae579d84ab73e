//! Cloud SQL Operations
//!
//! Mutating Cloud SQL calls return an operation handle instead of the
//! resource. [`wait_for_operation`] polls the handle until it is `DONE` or the
//! deadline passes. The wait is abandoned on timeout but the server-side
//! operation keeps running, so callers must re-read before acting again.

use super::client::GcpClient;
use crate::error::{ProviderError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Status of a Cloud SQL operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    SqlOperationStatusUnspecified,
    Pending,
    Running,
    Done,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationErrors {
    #[serde(default)]
    pub errors: Vec<OperationErrorDetail>,
}

/// A Cloud SQL long-running operation
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    pub name: String,
    pub status: OperationStatus,
    #[serde(default)]
    pub error: Option<OperationErrors>,
}

impl Operation {
    /// Decode an operation from a raw API response
    pub fn from_response(response: &Value) -> Result<Self> {
        Ok(serde_json::from_value(response.clone())?)
    }

    /// True when the response of a mutating call is an operation handle
    /// rather than the resource itself
    pub fn is_operation(response: &Value) -> bool {
        response
            .get("kind")
            .and_then(|k| k.as_str())
            .is_some_and(|k| k.ends_with("#operation"))
    }

    pub fn is_done(&self) -> bool {
        self.status == OperationStatus::Done
    }

    /// Server-reported failure reason, if the operation failed
    pub fn failure(&self) -> Option<String> {
        let errors = self.error.as_ref()?;
        if errors.errors.is_empty() {
            return None;
        }
        Some(
            errors
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Interval policy for operation polling. Intervals start at `initial`, grow
/// by `multiplier` and never exceed `max`; they never shrink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            multiplier: 2,
        }
    }
}

impl PollPolicy {
    /// Infinite sequence of sleep intervals between polls
    pub fn intervals(&self) -> impl Iterator<Item = Duration> {
        let max = self.max.max(self.initial);
        let multiplier = self.multiplier.max(1);
        std::iter::successors(Some(self.initial), move |prev| {
            Some(prev.saturating_mul(multiplier).min(max))
        })
    }
}

/// Wait for a Cloud SQL operation to finish
pub async fn wait_for_operation(
    client: &GcpClient,
    op: &Operation,
    project: &str,
    action: &str,
    timeout: Duration,
    policy: &PollPolicy,
) -> Result<()> {
    tracing::info!("Waiting for {} (operation {})", action, op.name);

    let poll = poll_until_done(client, op, project, action, policy);
    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Gave up waiting for {} after {:?}", action, timeout);
            Err(ProviderError::OperationTimeout {
                action: action.to_string(),
                timeout,
            })
        },
    }
}

async fn poll_until_done(
    client: &GcpClient,
    op: &Operation,
    project: &str,
    action: &str,
    policy: &PollPolicy,
) -> Result<()> {
    let url = client.sql_operation_url(project, &op.name);
    let mut current = op.clone();
    let mut intervals = policy.intervals();

    loop {
        if current.is_done() {
            return match current.failure() {
                Some(reason) => Err(ProviderError::OperationFailed {
                    action: action.to_string(),
                    reason,
                }),
                None => {
                    tracing::info!("Finished {}", action);
                    Ok(())
                },
            };
        }

        // successors() over Some(..) never ends
        let delay = intervals.next().unwrap_or(policy.max);
        tracing::debug!(
            "{}: operation {} is {:?}, polling again in {:?}",
            action,
            current.name,
            current.status,
            delay
        );
        tokio::time::sleep(delay).await;

        let response = client.get(&url).await?;
        current = Operation::from_response(&response)?;
    }
}
