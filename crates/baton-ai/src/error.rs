//! Error types for baton-ai

use thiserror::Error;

/// Result type alias using baton-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a model provider
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Whether the error happened while reading a response stream
    pub fn is_stream_error(&self) -> bool {
        matches!(self, Error::Sse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let e = Error::api("rate_limit_error", "slow down");
        assert_eq!(e.to_string(), "API error: slow down (type: rate_limit_error)");
    }

    #[test]
    fn test_stream_error_classification() {
        assert!(Error::Sse("connection reset".into()).is_stream_error());
        assert!(!Error::InvalidApiKey.is_stream_error());
        assert!(!Error::api("x", "y").is_stream_error());
    }

    #[test]
    fn test_json_error_converts() {
        let err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let e: Error = err.into();
        assert!(e.to_string().starts_with("JSON error:"));
    }
}
