//! Fetch URL tool: GET a page so the model can inspect the site it styles.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::time::Duration;
use stylesmith_core::error::ToolError;
use stylesmith_core::tool::{ParamType, ParameterSchema, Tool};
use tracing::debug;

/// Default cap on returned body bytes.
pub const DEFAULT_MAX_BYTES: usize = 100_000;

pub struct FetchUrlTool {
    client: reqwest::Client,
}

impl FetchUrlTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for FetchUrlTool {
    fn default() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::new(client)
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch a web page over HTTP(S) with GET. Returns the status code, content type and \
         the body text, cut to max_bytes."
    }

    fn parameter_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .required("url", ParamType::String, "The http:// or https:// URL to fetch")
            .optional(
                "max_bytes",
                ParamType::Number,
                "Maximum body bytes to return (default 100000)",
            )
    }

    fn is_write(&self) -> bool {
        false
    }

    async fn invoke(&self, parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        let url = parameters
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;

        // Validate URL format
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        let max_bytes = parameters
            .get("max_bytes")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_BYTES);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Network(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Network(format!("Failed to read body from {url}: {e}")))?;

        let total_bytes = body.len();
        let body = cut_at_char_boundary(&body, max_bytes);
        debug!(url, status = status.as_u16(), total_bytes, "Fetched URL");

        if !status.is_success() {
            return Err(ToolError::ExecutionFailed {
                tool_name: "fetch_url".into(),
                reason: format!("{url} returned HTTP {}", status.as_u16()),
            });
        }

        Ok(json!({
            "url": url,
            "status": status.as_u16(),
            "content_type": content_type,
            "truncated": body.len() < total_bytes,
            "body": body,
        }))
    }
}

fn cut_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
