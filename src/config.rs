//! Configuration Management
//!
//! Loads the gcprov configuration file.

use crate::gcp::client::{
    ApiEndpoints, DEFAULT_BIGQUERY_BASE_PATH, DEFAULT_READ_TIMEOUT, DEFAULT_SQL_BASE_PATH,
};
use crate::gcp::operation::PollPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default project for resources that don't name one
    #[serde(default)]
    pub project: Option<String>,
    /// Cloud SQL Admin API base path override
    #[serde(default)]
    pub sql_base_path: Option<String>,
    /// BigQuery API base path override
    #[serde(default)]
    pub bigquery_base_path: Option<String>,
    /// First wait between operation polls, in milliseconds
    #[serde(default)]
    pub poll_initial_ms: Option<u64>,
    /// Longest wait between operation polls, in milliseconds
    #[serde(default)]
    pub poll_max_ms: Option<u64>,
    /// Deadline of a single read request, in seconds
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gcprov").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_json(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("invalid config file")
    }

    /// Get effective project (CLI > config > environment/gcloud default)
    pub fn effective_project(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.project.clone())
            .or_else(crate::gcp::auth::get_default_project)
            .unwrap_or_default()
    }

    /// API base paths, validated
    pub fn endpoints(&self) -> Result<ApiEndpoints> {
        Ok(ApiEndpoints {
            sql: base_path(self.sql_base_path.as_deref(), DEFAULT_SQL_BASE_PATH)?,
            bigquery: base_path(self.bigquery_base_path.as_deref(), DEFAULT_BIGQUERY_BASE_PATH)?,
        })
    }

    pub fn poll_policy(&self) -> PollPolicy {
        let mut policy = PollPolicy::default();
        if let Some(ms) = self.poll_initial_ms {
            policy.initial = Duration::from_millis(ms);
        }
        if let Some(ms) = self.poll_max_ms {
            policy.max = Duration::from_millis(ms);
        }
        policy
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_READ_TIMEOUT)
    }
}

fn base_path(configured: Option<&str>, default: &str) -> Result<String> {
    let Some(path) = configured else {
        return Ok(default.to_string());
    };
    let url = Url::parse(path).with_context(|| format!("invalid API base path {path:?}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("API base path {path:?} must be http or https");
    }
    Ok(url.to_string())
}
