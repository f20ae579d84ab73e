//! HTTP utilities for GCP REST API calls

use crate::error::{ProviderError, Result};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate long responses and strip control characters before logging
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull the human readable message out of a GCP error body
/// (`{"error": {"code": 404, "message": "..."}}`), falling back to the status
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| status.to_string())
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl GcpHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gcprov/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Send a request and decode the JSON response. Empty bodies decode to
    /// `Value::Null`.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let response_body = response.text().await?;

        if !status.is_success() {
            // Only the sanitized/truncated body goes to the log
            if status == reqwest::StatusCode::NOT_FOUND {
                tracing::debug!("API not found: {} - {}", status, sanitize_for_log(&response_body));
            } else {
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            }
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_message(status, &response_body),
            });
        }

        if response_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&response_body)?)
    }
}

/// Format a provider error for display, adding a hint for the common cases
pub fn describe_error(error: &ProviderError) -> String {
    let hint = match error {
        ProviderError::Api { status: 401, .. } | ProviderError::Auth(_) => {
            Some("Run 'gcloud auth application-default login'.")
        },
        ProviderError::Api { status: 403, .. } => Some("Check your GCP IAM permissions."),
        ProviderError::Api { status: 404, .. } => Some("Resource not found."),
        ProviderError::Api { status: 409, .. } => {
            Some("The resource may already exist or be in use.")
        },
        ProviderError::Api { status: 429, .. } => Some("Rate limit exceeded. Try again later."),
        ProviderError::OperationTimeout { .. } => {
            Some("The operation may still be running; re-read the resource before retrying.")
        },
        _ => None,
    };

    match hint {
        Some(hint) => format!("{error}. {hint}"),
        None => error.to_string(),
    }
}
