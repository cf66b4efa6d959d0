//! HTTP tool - guarded GET requests

use crate::error::{Error, Result};
use crate::tool::{Tool, ToolResult};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use talos_llm::ToolDefinition;
use tracing::warn;
use url::Url;

/// Default HTTP request timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum response body bytes returned to the model
const MAX_RESPONSE_BYTES: usize = 256 * 1024;

/// Blocked hosts for SSRF protection
static BLOCKED_HOSTS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "localhost",
        "127.0.0.1",
        "0.0.0.0",
        "::1",
        "[::1]",
        "metadata.google.internal",
        "169.254.169.254",
        "metadata.internal",
    ])
});

/// Check for private/internal IP ranges
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// Validate a URL for scheme and destination safety
fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str).map_err(|e| Error::InvalidInput(format!("invalid URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            warn!(scheme = %scheme, "Blocked non-HTTP URL scheme");
            return Err(Error::PermissionDenied(format!(
                "URL scheme '{scheme}' is not allowed, only http/https"
            )));
        }
    }

    if let Some(host) = url.host_str() {
        let host_lower = host.to_lowercase();

        if BLOCKED_HOSTS.contains(host_lower.as_str()) {
            warn!(host = %host, "Blocked request to internal host");
            return Err(Error::PermissionDenied(format!(
                "requests to '{host}' are blocked"
            )));
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            if is_private_ip(&ip) {
                warn!(ip = %ip, "Blocked request to private IP");
                return Err(Error::PermissionDenied(
                    "requests to private addresses are blocked".to_string(),
                ));
            }
        }

        if host_lower.ends_with(".internal")
            || host_lower.ends_with(".local")
            || host_lower.ends_with(".localhost")
        {
            warn!(host = %host, "Blocked request to internal domain");
            return Err(Error::PermissionDenied(format!(
                "requests to '{host}' are blocked"
            )));
        }
    }

    Ok(url)
}

/// Fetch a URL with GET
pub struct HttpGetTool {
    definition: ToolDefinition,
    client: reqwest::Client,
}

impl Default for HttpGetTool {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpGetTool {
    /// Create a new HTTP GET tool
    #[must_use]
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition::new(
                "http_get",
                "Fetch a public http(s) URL and return status and body",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "URL to fetch"}
                    },
                    "required": ["url"]
                }),
            ),
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for HttpGetTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let started = Instant::now();
        let raw = input
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidInput("missing 'url' argument".to_string()))?;

        let url = validate_url(raw)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Execution(format!("GET {raw}: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Execution(format!("read body: {e}")))?;

        let truncated = body.len() > MAX_RESPONSE_BYTES;
        let body: String = if truncated {
            body.chars().take(MAX_RESPONSE_BYTES).collect()
        } else {
            body
        };

        Ok(ToolResult::success(
            serde_json::json!({
                "status": status,
                "body": body,
                "truncated": truncated,
            }),
            started.elapsed().as_millis() as u64,
        ))
    }
}
