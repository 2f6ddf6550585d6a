//! Terminal value of a run

use baton_ai::Usage;
use serde::{Deserialize, Serialize};

use crate::error::{Error, FailureKind};

/// One executed tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Agent that made the call
    pub agent: String,
    pub call_id: String,
    pub name: String,
    /// Raw argument text as produced by the model
    pub arguments: String,
    pub output: String,
    pub is_error: bool,
}

/// Bookkeeping attached to every result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Agents the run passed through, in order
    pub handoff_tracker: Vec<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Model calls made across all agents
    pub turns: u32,
    /// Agent that produced the result
    pub last_agent: Option<String>,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Parsed final output, for agents with an output type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<serde_json::Value>,
}

/// Result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub content: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub metadata: ResultMetadata,
}

impl AgentResult {
    pub fn success(content: impl Into<String>, metadata: ResultMetadata) -> Self {
        Self {
            content: content.into(),
            success: true,
            error: None,
            failure: None,
            metadata,
        }
    }

    pub fn failure(error: &Error, metadata: ResultMetadata) -> Self {
        Self {
            content: String::new(),
            success: false,
            error: Some(error.to_string()),
            failure: Some(error.kind()),
            metadata,
        }
    }

    /// Check if the run ran out of turns
    pub fn is_max_turns_exceeded(&self) -> bool {
        self.failure == Some(FailureKind::MaxTurnsExceeded)
    }
}
