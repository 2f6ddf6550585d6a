//! Streaming event types and utilities

use crate::types::{Completion, FinishReason, ToolCall, Usage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted while a provider streams a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text content delta
    TextDelta { delta: String },
    /// Fragment of a tool call. `id` and `name` usually arrive on the first
    /// fragment for an index, `arguments` is a piece of the JSON text.
    ToolCallDelta {
        index: usize,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Option<String>,
    },
    /// Complete tool calls delivered in one piece
    ToolCalls { calls: Vec<ToolCall> },
    /// Response completed
    Done {
        usage: Usage,
        finish_reason: Option<FinishReason>,
    },
    /// Error occurred, the stream ends after this
    Error { message: String },
}

impl StreamEvent {
    /// Check if this is a terminal event (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

/// A stream of provider events
pub type StreamEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Turn a complete response into the event sequence a streaming provider
/// would have produced.
pub fn completion_events(completion: Completion) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    if let Some(text) = completion.text.filter(|t| !t.is_empty()) {
        events.push(StreamEvent::TextDelta { delta: text });
    }
    if !completion.tool_calls.is_empty() {
        events.push(StreamEvent::ToolCalls {
            calls: completion.tool_calls,
        });
    }
    events.push(StreamEvent::Done {
        usage: completion.usage,
        finish_reason: completion.finish_reason,
    });
    events
}

#[derive(Debug, Default)]
struct FragmentBuffer {
    id: String,
    name: String,
    arguments: String,
}

/// Buffers tool-call fragments by index until the batch is complete.
///
/// Argument text is only trusted once it parses as a whole JSON document.
/// A buffer that never becomes well-formed is still emitted with its raw
/// text, so the runtime reports a per-call argument error instead of
/// silently dispatching a truncated payload.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    buffers: BTreeMap<usize, FragmentBuffer>,
    complete: Vec<ToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one fragment for the call at `index`
    pub fn push_fragment(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let buffer = self.buffers.entry(index).or_default();
        if let Some(id) = id.filter(|s| !s.is_empty()) {
            buffer.id = id.to_string();
        }
        if let Some(name) = name.filter(|s| !s.is_empty()) {
            buffer.name = name.to_string();
        }
        if let Some(args) = arguments {
            buffer.arguments.push_str(args);
        }
    }

    /// Add calls that arrived whole
    pub fn push_complete(&mut self, calls: &[ToolCall]) {
        self.complete.extend_from_slice(calls);
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.complete.is_empty()
    }

    /// Number of distinct calls seen so far
    pub fn len(&self) -> usize {
        self.buffers.len() + self.complete.len()
    }

    /// Finalize all buffered calls, in index order, followed by whole calls
    /// not already assembled from fragments.
    pub fn finish(self) -> Vec<ToolCall> {
        let mut calls: Vec<ToolCall> = Vec::with_capacity(self.len());
        for (index, buffer) in self.buffers {
            let id = if buffer.id.is_empty() {
                format!("call_{}", index)
            } else {
                buffer.id
            };
            let arguments = normalize_arguments(&buffer.arguments).unwrap_or_else(|| {
                tracing::warn!(
                    "Tool call '{}' ({}) finished with malformed arguments",
                    buffer.name,
                    id
                );
                buffer.arguments
            });
            calls.push(ToolCall {
                id,
                name: buffer.name,
                arguments,
            });
        }
        for call in self.complete {
            if !calls.iter().any(|c| c.id == call.id) {
                calls.push(call);
            }
        }
        calls
    }
}

/// Re-serialize well-formed argument text; `None` if it does not parse.
fn normalize_arguments(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return Some("{}".to_string());
    }
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .map(|v| v.to_string())
}

/// Builds a [`Completion`] from streaming events
#[derive(Debug, Default)]
pub struct StreamCollector {
    text: String,
    tool_calls: ToolCallAccumulator,
    usage: Usage,
    finish_reason: Option<FinishReason>,
    done: bool,
    error: Option<String>,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a streaming event and update the collected state
    pub fn process_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta { delta } => self.text.push_str(delta),
            StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => self.tool_calls.push_fragment(
                *index,
                id.as_deref(),
                name.as_deref(),
                arguments.as_deref(),
            ),
            StreamEvent::ToolCalls { calls } => self.tool_calls.push_complete(calls),
            StreamEvent::Done {
                usage,
                finish_reason,
            } => {
                self.usage = *usage;
                self.finish_reason = *finish_reason;
                self.done = true;
            }
            StreamEvent::Error { message } => {
                self.error = Some(message.clone());
                self.done = true;
            }
        }
    }

    /// Text collected so far
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The stream error, if one was seen
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Build the final completion
    pub fn finish(self) -> Completion {
        let tool_calls = self.tool_calls.finish();
        let finish_reason = self.finish_reason.or(if tool_calls.is_empty() {
            None
        } else {
            Some(FinishReason::ToolCalls)
        });
        Completion {
            text: if self.text.is_empty() {
                None
            } else {
                Some(self.text)
            },
            tool_calls,
            usage: self.usage,
            finish_reason,
        }
    }
}
