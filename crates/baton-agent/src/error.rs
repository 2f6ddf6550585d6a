//! Error types for baton-agent

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using baton-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end a run.
///
/// Per-call tool problems (bad arguments, unknown tools, failing tools) never
/// become an `Error`; they are fed back to the model as tool results.
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the model provider
    #[error(transparent)]
    Ai(#[from] baton_ai::Error),

    /// The run input was empty
    #[error("Input must not be empty")]
    EmptyInput,

    /// The provider stream reported an error
    #[error("Stream error: {0}")]
    Stream(String),

    /// The model returned neither text nor tool calls
    #[error("Model returned neither text nor tool calls")]
    MalformedResponse,

    /// Final output did not satisfy the agent's output schema
    #[error("Output does not match the declared output type: {0}")]
    OutputSchema(String),

    /// The turn budget ran out before a final answer
    #[error("Max turns ({max_turns}) exceeded")]
    MaxTurnsExceeded { max_turns: u32 },

    /// An input guardrail rejected the run input
    #[error("{message}")]
    InputGuardrail { guardrail: String, message: String },

    /// An output guardrail rejected the final output
    #[error("{message}")]
    OutputGuardrail { guardrail: String, message: String },

    /// The caller's wall-clock limit elapsed
    #[error("Run timed out after {0:?}")]
    Timeout(Duration),
}

/// Machine-checkable category of a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    Provider,
    Stream,
    MalformedResponse,
    OutputSchema,
    MaxTurnsExceeded,
    Guardrail,
    Timeout,
}

impl Error {
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Ai(e) if e.is_stream_error() => FailureKind::Stream,
            Error::Ai(_) => FailureKind::Provider,
            Error::EmptyInput => FailureKind::InvalidInput,
            Error::Stream(_) => FailureKind::Stream,
            Error::MalformedResponse => FailureKind::MalformedResponse,
            Error::OutputSchema(_) => FailureKind::OutputSchema,
            Error::MaxTurnsExceeded { .. } => FailureKind::MaxTurnsExceeded,
            Error::InputGuardrail { .. } | Error::OutputGuardrail { .. } => FailureKind::Guardrail,
            Error::Timeout(_) => FailureKind::Timeout,
        }
    }

    /// Whether the message may quote model output or run input
    pub fn quotes_payload(&self) -> bool {
        matches!(self, Error::OutputSchema(_))
    }

    /// Check if the run stopped because its turn budget ran out
    pub fn is_max_turns_exceeded(&self) -> bool {
        matches!(self, Error::MaxTurnsExceeded { .. })
    }
}
