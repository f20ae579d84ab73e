//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication
//! and HTTP functionality.

use super::auth::GcpCredentials;
use super::http::GcpHttpClient;
use crate::error::Result;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

/// Default Cloud SQL Admin API base path
pub const DEFAULT_SQL_BASE_PATH: &str = "https://sqladmin.googleapis.com/sql/v1beta4/";

/// Default BigQuery API base path
pub const DEFAULT_BIGQUERY_BASE_PATH: &str = "https://bigquery.googleapis.com/bigquery/v2/";

/// Deadline of a single GET (reads and operation polls)
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Base paths for the APIs this crate talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub sql: String,
    pub bigquery: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            sql: DEFAULT_SQL_BASE_PATH.to_string(),
            bigquery: DEFAULT_BIGQUERY_BASE_PATH.to_string(),
        }
    }
}

impl ApiEndpoints {
    /// Point both APIs at one root (used against emulators and mock servers)
    pub fn with_root(root: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            sql: format!("{root}/sql/v1beta4/"),
            bigquery: format!("{root}/bigquery/v2/"),
        }
    }
}

fn with_trailing_slash(base: &str) -> String {
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    }
}

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    /// Project used when a resource doesn't name one
    pub project_id: String,
    pub endpoints: ApiEndpoints,
    pub read_timeout: Duration,
}

impl GcpClient {
    /// Create a new GCP client using ambient credentials
    pub async fn new(project_id: &str, endpoints: ApiEndpoints) -> Result<Self> {
        let credentials = GcpCredentials::new().await?;
        Self::with_credentials(credentials, project_id, endpoints)
    }

    /// Create a client around already resolved credentials
    pub fn with_credentials(
        credentials: GcpCredentials,
        project_id: &str,
        endpoints: ApiEndpoints,
    ) -> Result<Self> {
        let http = GcpHttpClient::new()?;
        let endpoints = ApiEndpoints {
            sql: with_trailing_slash(&endpoints.sql),
            bigquery: with_trailing_slash(&endpoints.bigquery),
        };

        Ok(Self {
            credentials,
            http,
            project_id: project_id.to_string(),
            endpoints,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Send an authenticated request
    pub async fn send_request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let token = self.credentials.get_token().await?;
        self.http.send(method, url, &token, body, timeout).await
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value> {
        self.send_request(Method::GET, url, None, Some(self.read_timeout))
            .await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, body: &Value, timeout: Duration) -> Result<Value> {
        self.send_request(Method::POST, url, Some(body), Some(timeout))
            .await
    }

    /// Make a PUT request to a GCP API
    pub async fn put(&self, url: &str, body: &Value, timeout: Duration) -> Result<Value> {
        self.send_request(Method::PUT, url, Some(body), Some(timeout))
            .await
    }

    /// Make a DELETE request to a GCP API
    pub async fn delete(&self, url: &str, timeout: Duration) -> Result<Value> {
        self.send_request(Method::DELETE, url, None, Some(timeout))
            .await
    }

    // =========================================================================
    // Cloud SQL Admin API helpers
    // =========================================================================

    /// Build Cloud SQL Admin API URL
    pub fn sql_url(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.sql, path)
    }

    /// Build the URL of a Cloud SQL operation
    pub fn sql_operation_url(&self, project: &str, operation: &str) -> String {
        self.sql_url(&format!(
            "projects/{}/operations/{}",
            encode(project),
            encode(operation)
        ))
    }

    // =========================================================================
    // BigQuery API helpers
    // =========================================================================

    /// Build BigQuery API URL
    pub fn bigquery_url(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.bigquery, path)
    }
}

/// Percent-encode a single path segment
pub fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}
