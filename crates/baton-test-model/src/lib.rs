//! A local scripted model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use baton_ai::{
    Completion, CompletionRequest, Error, ModelProvider, Result, StreamEvent, StreamEventStream,
    Usage,
};
use parking_lot::Mutex;

pub use preset::*;

/// Decides the reply to a request when the script queue is empty
pub type Responder = Arc<dyn Fn(&CompletionRequest) -> ScriptedResponse + Send + Sync>;

/// A fake model that replies from a script.
///
/// Replies are taken from the queue in order; once it is empty the optional
/// responder closure is consulted, and without one the call fails. Every
/// request is recorded so tests can inspect what the runtime sent.
///
/// Streamed replies are cut into small chunks (text and tool-call
/// arguments alike) to exercise fragment reassembly.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ScriptedResponse>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
    usage: Usage,
    chunk_size: usize,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            usage: Usage {
                input: 10,
                output: 5,
            },
            chunk_size: 4,
            delay: None,
        }
    }

    /// A provider that answers every request with `f`
    pub fn from_fn(
        f: impl Fn(&CompletionRequest) -> ScriptedResponse + Send + Sync + 'static,
    ) -> Self {
        Self::new([]).with_responder(f)
    }

    pub fn with_responder(
        mut self,
        f: impl Fn(&CompletionRequest) -> ScriptedResponse + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Arc::new(f));
        self
    }

    /// Usage reported for replies that do not carry their own
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Characters per streamed chunk
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sleep before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Append a reply to the script
    pub fn push(&self, response: ScriptedResponse) {
        self.script.lock().push_back(response);
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    async fn next_response(&self, request: &CompletionRequest) -> ScriptedResponse {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(response) => response,
            None => match &self.responder {
                Some(responder) => responder(request),
                None => ScriptedResponse::fail("script exhausted"),
            },
        }
    }

    fn with_default_usage(&self, mut completion: Completion) -> Completion {
        if completion.usage == Usage::default() {
            completion.usage = self.usage;
        }
        completion
    }

    fn stream_events(&self, completion: Completion) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(text) = &completion.text {
            events.extend(
                chunks(text, self.chunk_size)
                    .into_iter()
                    .map(|delta| StreamEvent::TextDelta { delta }),
            );
        }
        for (index, call) in completion.tool_calls.iter().enumerate() {
            let mut pieces = chunks(&call.arguments, self.chunk_size).into_iter();
            events.push(StreamEvent::ToolCallDelta {
                index,
                id: Some(call.id.clone()),
                name: Some(call.name.clone()),
                arguments: pieces.next(),
            });
            events.extend(pieces.map(|piece| StreamEvent::ToolCallDelta {
                index,
                id: None,
                name: None,
                arguments: Some(piece),
            }));
        }
        events.push(StreamEvent::Done {
            usage: completion.usage,
            finish_reason: completion.finish_reason,
        });
        events
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        match self.next_response(request).await {
            ScriptedResponse::Reply(completion) => Ok(self.with_default_usage(completion)),
            ScriptedResponse::Fail(message) => Err(Error::api("scripted_error", message)),
            ScriptedResponse::StreamError { message, .. } => Err(Error::Sse(message)),
        }
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<StreamEventStream> {
        let events = match self.next_response(request).await {
            ScriptedResponse::Reply(completion) => {
                self.stream_events(self.with_default_usage(completion))
            }
            ScriptedResponse::Fail(message) => {
                return Err(Error::api("scripted_error", message));
            }
            ScriptedResponse::StreamError {
                partial_text,
                message,
            } => {
                let mut events: Vec<StreamEvent> = chunks(&partial_text, self.chunk_size)
                    .into_iter()
                    .map(|delta| StreamEvent::TextDelta { delta })
                    .collect();
                events.push(StreamEvent::Error { message });
                events
            }
        };

        Ok(Box::pin(async_stream::stream! {
            for event in events {
                tokio::task::yield_now().await;
                yield event;
            }
        }))
    }
}

/// Split `s` into pieces of at most `size` characters
fn chunks(s: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}
