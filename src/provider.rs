//! Provider context
//!
//! Everything a CRUD orchestrator needs besides the resource itself: the API
//! client, the lock registry shared by every operation of this provider and
//! the operation polling policy.

use crate::error::{ProviderError, Result};
use crate::gcp::client::GcpClient;
use crate::gcp::operation::PollPolicy;
use crate::mutex::MutexKv;

#[derive(Clone)]
pub struct ProviderContext {
    pub client: GcpClient,
    pub locks: MutexKv,
    pub poll: PollPolicy,
}

impl ProviderContext {
    pub fn new(client: GcpClient) -> Self {
        Self {
            client,
            locks: MutexKv::new(),
            poll: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Resolve the project of a resource: its own setting, else the provider's
    pub fn project(&self, configured: Option<&str>) -> Result<String> {
        configured
            .filter(|p| !p.is_empty())
            .or(Some(self.client.project_id.as_str()).filter(|p| !p.is_empty()))
            .map(|p| p.to_string())
            .ok_or_else(|| ProviderError::MissingValue("project".to_string()))
    }
}
