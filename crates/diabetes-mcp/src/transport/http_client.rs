//! HTTP client transport for MCP
//!
//! Posts each JSON-RPC message to a server endpoint such as the one
//! [`router`](super::http::router) serves.
//!
//! ```rust,ignore
//! use diabetes_mcp::{HttpTransport, McpClient};
//!
//! let transport = HttpTransport::new("http://127.0.0.1:8000/mcp").build()?;
//! let client = McpClient::connect(transport).await?;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::Transport;
use crate::protocol::{McpError, McpResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    headers: HashMap<String, String>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder {
            url: url.into(),
            headers: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`HttpTransport`]
pub struct HttpTransportBuilder {
    url: String,
    headers: HashMap<String, String>,
    timeout: Duration,
}

impl HttpTransportBuilder {
    /// Add a header sent with every request
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Per-request HTTP timeout (default: 30s)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> McpResult<HttpTransport> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| McpError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpTransport {
            url: self.url,
            client,
            headers: self.headers,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, message: &str) -> McpResult<Option<String>> {
        tracing::debug!(url = %self.url, "MCP HTTP send: {}", message);

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream");
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .body(message.to_string())
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!(
                "HTTP error {}: {}",
                status, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| McpError::Transport(format!("Failed to read response: {}", e)))?;

        // 202 Accepted carries no body: the message was a notification.
        if status == StatusCode::ACCEPTED || body.trim().is_empty() {
            return Ok(None);
        }
        tracing::debug!(url = %self.url, "MCP HTTP response: {}", body);
        Ok(Some(body))
    }
}
