//! Current date and time

use async_trait::async_trait;
use baton_agent::{Tool, ToolError};
use chrono::{Local, Utc};
use serde_json::json;

/// Tool reporting the current time in UTC or the local zone
pub struct CurrentTimeTool;

impl CurrentTimeTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time as RFC 3339 text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "enum": ["utc", "local"],
                    "description": "Zone to report the time in (default: utc)"
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        match arguments.get("timezone").and_then(|v| v.as_str()) {
            None | Some("utc") => Ok(Utc::now().to_rfc3339()),
            Some("local") => Ok(Local::now().to_rfc3339()),
            Some(other) => Err(ToolError::new(format!("Unknown timezone: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reports_parseable_time() {
        let tool = CurrentTimeTool::new();
        let text = tool.execute(json!({})).await.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&text).is_ok());

        let local = tool.execute(json!({"timezone": "local"})).await.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&local).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_zone_is_an_error() {
        let err = CurrentTimeTool::new()
            .execute(json!({"timezone": "mars"}))
            .await
            .unwrap_err();
        assert_eq!(err.message, "Unknown timezone: mars");
    }
}
