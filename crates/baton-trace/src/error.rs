//! Error types for baton-trace

use thiserror::Error;

/// Result type alias using baton-trace TraceError
pub type Result<T> = std::result::Result<T, TraceError>;

/// Errors raised by trace processors
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A sink rejected the trace
    #[error("Trace sink '{sink}' failed: {message}")]
    Sink { sink: String, message: String },
}

impl TraceError {
    pub fn sink(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sink {
            sink: sink.into(),
            message: message.into(),
        }
    }
}
