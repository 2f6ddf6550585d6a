//! Model provider implementations

pub mod openai;

use crate::{
    Completion, CompletionRequest, Error, Result,
    stream::{StreamEventStream, completion_events},
};
use async_trait::async_trait;

/// Trait for model providers.
///
/// `complete` returns a whole response. `stream` returns incremental events;
/// the default implementation replays the buffered response as a stream for
/// providers without native streaming.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name used in logs and trace data
    fn name(&self) -> &str {
        "provider"
    }

    /// Request a complete response
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Stream a response
    async fn stream(&self, request: &CompletionRequest) -> Result<StreamEventStream> {
        let completion = self.complete(request).await?;
        Ok(Box::pin(tokio_stream::iter(completion_events(completion))))
    }
}

/// Get an API key from a provided value or the environment
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = provided.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    std::env::var(env_var).map_err(|_| Error::InvalidApiKey)
}
