//! HTTP GET tool

use std::time::Duration;

use async_trait::async_trait;
use baton_agent::{Tool, ToolError};
use serde_json::json;

use crate::utils::truncate_chars;

const DEFAULT_MAX_CHARS: usize = 4000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Tool fetching the body of a web page
pub struct FetchUrlTool {
    client: reqwest::Client,
}

impl FetchUrlTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("baton/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for FetchUrlTool {
    fn default() -> Self {
        Self::new()
    }
}

fn check_url(url: &str) -> Result<reqwest::Url, ToolError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|e| ToolError::new(format!("Invalid URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ToolError::new(format!("Unsupported URL scheme: {}", other))),
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch a web page over HTTP(S) and return its body as text, truncated to max_chars."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http or https URL"
                },
                "max_chars": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum characters of body to return (default: 4000)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let url = arguments
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::new("Missing 'url' argument"))?;
        let url = check_url(url)?;
        let max_chars = arguments
            .get("max_chars")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_CHARS);

        tracing::debug!(url = %url, "fetching");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::new(format!("Request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::new(format!("Failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(ToolError::new(format!(
                "HTTP {}: {}",
                status,
                truncate_chars(&body, 200)
            )));
        }
        Ok(truncate_chars(&body, max_chars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_url() {
        assert!(check_url("https://example.com/a?b=c").is_ok());
        assert_eq!(
            check_url("file:///etc/passwd").unwrap_err().message,
            "Unsupported URL scheme: file"
        );
        assert!(check_url("not a url").unwrap_err().message.starts_with("Invalid URL"));
    }

    #[tokio::test]
    async fn test_missing_url_argument() {
        let err = FetchUrlTool::new().execute(json!({})).await.unwrap_err();
        assert_eq!(err.message, "Missing 'url' argument");
    }
}
