//! HTTP transport for SoftLayer REST calls

use super::auth::Credentials;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Per-request timeout; order placement can take a while to be accepted
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = match body.char_indices().nth(MAX_LOG_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... [truncated, {} bytes total]", &body[..cut], body.len()),
        None => body.to_string(),
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Status code and body text of one exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Failure below HTTP: DNS, connect, TLS, timeout
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Capability to perform one HTTP exchange against the API
///
/// `path` is relative to the API endpoint and already carries its query
/// string. Implementations must not interpret status codes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn do_request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport with basic auth
#[derive(Clone)]
pub struct SlHttpClient {
    client: Client,
    base_url: Url,
    credentials: Credentials,
}

impl SlHttpClient {
    /// Create a new HTTP client for `endpoint`
    pub fn new(endpoint: &str, credentials: Credentials) -> Result<Self> {
        let mut base_url =
            Url::parse(endpoint).with_context(|| format!("Invalid API endpoint: {}", endpoint))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(concat!("slcloud/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl Transport for SlHttpClient {
    async fn do_request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<RawResponse, TransportError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| TransportError(format!("Invalid request path {}: {}", path, e)))?;

        tracing::debug!("{} {}", method, url.path());

        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.credentials.username, Some(self.credentials.api_key()));

        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError(format!("Failed to send request: {}", e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(format!("Failed to read response body: {}", e)))?;

        if super::classify::is_error_code(status) {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
        }

        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "é".repeat(300);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("[truncated, 600 bytes total]"));
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("a\nb\tc d"), "abc d");
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = SlHttpClient::new(
            "https://api.softlayer.com/rest/v3",
            Credentials::new("user", "key"),
        )
        .unwrap();
        assert_eq!(client.base_url().as_str(), "https://api.softlayer.com/rest/v3/");
        assert_eq!(
            client.base_url().join("SoftLayer_Account/getObject.json").unwrap().as_str(),
            "https://api.softlayer.com/rest/v3/SoftLayer_Account/getObject.json"
        );
    }
}
