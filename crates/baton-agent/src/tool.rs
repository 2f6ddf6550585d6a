//! Tool trait and execution

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a failing tool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ToolError {
    pub message: String,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ToolError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ToolError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Outcome of one tool call as fed back to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content of the tool message
    pub content: String,
    /// Whether the call failed
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            is_error: false,
        }
    }

    /// Create an error result; the content reads `Error: <message>`
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            content: format!("Error: {}", message),
            is_error: true,
        }
    }
}

/// Trait for executable tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in API calls)
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with parsed arguments
    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError>;
}

/// Type alias for a boxed tool
pub type BoxedTool = Arc<dyn Tool>;

/// Convert a Tool to the spec advertised to the model
pub fn to_tool_spec(tool: &dyn Tool) -> baton_ai::ToolSpec {
    baton_ai::ToolSpec {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters_schema(),
    }
}

type Handler =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync>;

/// A tool backed by an async closure
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    schema: serde_json::Value,
    handler: Handler,
}

impl FunctionTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    pub fn boxed(self) -> BoxedTool {
        Arc::new(self)
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        (self.handler)(arguments).await
    }
}

/// Compile a JSON schema, logging and skipping schemas that do not compile
pub(crate) fn compile_schema(owner: &str, schema: &serde_json::Value) -> Option<Arc<jsonschema::Validator>> {
    match jsonschema::validator_for(schema) {
        Ok(validator) => Some(Arc::new(validator)),
        Err(e) => {
            tracing::warn!(
                "Invalid parameter schema for '{}', skipping validation: {}",
                owner,
                e
            );
            None
        }
    }
}

/// Validate arguments using a pre-compiled validator.
/// Returns `Some(error_message)` if validation fails, `None` if valid.
pub(crate) fn validate_with_validator(
    args: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!("Argument validation failed: {}", errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool() -> FunctionTool {
        FunctionTool::new(
            "echo",
            "Echoes input",
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
            |args| async move {
                args.get("text")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| ToolError::new("missing text"))
            },
        )
    }

    #[tokio::test]
    async fn test_function_tool_executes() {
        let tool = echo_tool();
        assert_eq!(tool.execute(json!({"text": "hello"})).await.unwrap(), "hello");
        let err = tool.execute(json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "missing text");
    }

    #[test]
    fn test_tool_result_error_prefix() {
        let r = ToolResult::error(ToolError::new("boom"));
        assert!(r.is_error);
        assert_eq!(r.content, "Error: boom");
        assert!(!ToolResult::text("ok").is_error);
    }

    #[test]
    fn test_to_tool_spec() {
        let tool = echo_tool();
        let spec = to_tool_spec(&tool);
        assert_eq!(spec.name, "echo");
        assert_eq!(spec.description, "Echoes input");
        assert_eq!(spec.parameters["required"][0], "text");
    }

    #[test]
    fn test_validation_reports_missing_field() {
        let validator = compile_schema("echo", &echo_tool().parameters_schema()).unwrap();
        let msg = validate_with_validator(&json!({"other": 1}), &validator).unwrap();
        assert!(msg.contains("validation failed"), "got: {}", msg);
        assert!(msg.contains("text"), "got: {}", msg);
        assert!(validate_with_validator(&json!({"text": "x"}), &validator).is_none());
    }

    #[test]
    fn test_invalid_schema_is_skipped() {
        assert!(compile_schema("bad", &json!({"type": "not_a_real_type"})).is_none());
    }
}
