//! Span records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of operation a span records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// One agent's turn loop
    Agent,
    /// One model call
    Generation,
    /// One tool execution
    Function,
    /// A delegation from one agent to another
    Handoff,
    Custom,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Agent => "agent",
            SpanKind::Generation => "generation",
            SpanKind::Function => "function",
            SpanKind::Handoff => "handoff",
            SpanKind::Custom => "custom",
        }
    }
}

/// Span data keys holding raw payloads, redacted unless sensitive data is
/// included.
pub const SENSITIVE_KEYS: &[&str] = &["input", "output", "arguments", "result"];

/// One recorded, timed operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub span_id: String,
    pub trace_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub kind: SpanKind,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Span {
    pub(crate) fn new(
        trace_id: &str,
        parent_id: Option<String>,
        kind: SpanKind,
        name: impl Into<String>,
    ) -> Self {
        Self {
            span_id: format!("span_{}", uuid::Uuid::new_v4().simple()),
            trace_id: trace_id.to_string(),
            parent_id,
            name: name.into(),
            kind,
            data: Map::new(),
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Elapsed time in milliseconds, if the span has ended
    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Replace a payload with a description of its shape
pub(crate) fn redact(value: &Value) -> Value {
    let mut shape = Map::new();
    shape.insert("redacted".into(), Value::Bool(true));
    match value {
        Value::String(s) => {
            shape.insert("chars".into(), s.chars().count().into());
        }
        Value::Array(items) => {
            shape.insert("items".into(), items.len().into());
        }
        Value::Object(fields) => {
            shape.insert("fields".into(), fields.len().into());
        }
        _ => {}
    }
    Value::Object(shape)
}

/// Merge `partial` into `data`, redacting sensitive keys if asked to
/// Placeholder for an error message that may quote run payloads
pub(crate) fn redact_message(message: &str) -> String {
    format!("[redacted: {} chars]", message.chars().count())
}

pub(crate) fn merge_data(
    data: &mut Map<String, Value>,
    partial: Map<String, Value>,
    include_sensitive: bool,
) {
    for (key, value) in partial {
        let value = if !include_sensitive && SENSITIVE_KEYS.contains(&key.as_str()) {
            redact(&value)
        } else {
            value
        };
        data.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_redaction_keeps_shape() {
        let mut data = Map::new();
        merge_data(
            &mut data,
            as_map(json!({
                "input": "secret prompt",
                "arguments": {"a": 1, "b": 2},
                "model": "gpt-4o-mini"
            })),
            false,
        );
        assert_eq!(data["input"], json!({"redacted": true, "chars": 13}));
        assert_eq!(data["arguments"], json!({"redacted": true, "fields": 2}));
        assert_eq!(data["model"], "gpt-4o-mini");
    }

    #[test]
    fn test_sensitive_data_kept_when_included() {
        let mut data = Map::new();
        merge_data(&mut data, as_map(json!({"output": "4"})), true);
        assert_eq!(data["output"], "4");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_value(SpanKind::Function).unwrap(), "function");
        assert_eq!(SpanKind::Handoff.as_str(), "handoff");
    }
}
