//! Streamed runs: the turn loop driven by incremental provider events

use baton_ai::{Completion, CompletionRequest, ModelProvider, StreamCollector, StreamEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    agent::Agent,
    context::RunContext,
    error::{Error, FailureKind, Result},
    result::AgentResult,
    runner::{RunInput, Runner},
};

/// Events observed by a streaming client, in order.
///
/// A run ends with exactly one of `Error` or `Complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The run started
    Start {
        agent: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trace_id: Option<String>,
    },
    /// An agent loop started (the entry agent or a handoff target)
    AgentStart { agent: String },
    /// Model text delta
    Token { agent: String, delta: String },
    ToolStart {
        agent: String,
        call_id: String,
        name: String,
        arguments: String,
    },
    ToolEnd {
        agent: String,
        call_id: String,
        name: String,
        output: String,
        is_error: bool,
    },
    /// Control is being handed from one agent to another
    Handoff { from: String, to: String },
    /// The run failed
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<FailureKind>,
    },
    /// The run succeeded
    Complete { result: Box<AgentResult> },
}

impl RunEvent {
    pub(crate) fn error(error: &Error) -> Self {
        RunEvent::Error {
            message: error.to_string(),
            kind: Some(error.kind()),
        }
    }

    /// Check if this event ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Error { .. } | RunEvent::Complete { .. })
    }
}

/// Where a run reports its events; a buffered run has no receiver
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::UnboundedSender<RunEvent>>,
    /// Drop `Start` and terminal events; the caller sends its own
    nested: bool,
}

impl EventSink {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self {
            tx: Some(tx),
            nested: false,
        }
    }

    /// Same receiver, for runs that are steps of a larger run.
    ///
    /// A nested run keeps the context's bookkeeping from earlier steps.
    pub fn nested(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            nested: true,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.tx.is_some()
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn emit(&self, event: RunEvent) {
        if self.nested && (event.is_terminal() || matches!(event, RunEvent::Start { .. })) {
            return;
        }
        if let Some(ref tx) = self.tx {
            // A dropped receiver does not stop the run.
            let _ = tx.send(event);
        }
    }
}

/// Consume one streamed model response.
///
/// Text deltas are forwarded as `Token` events; tool-call fragments are
/// buffered by the collector until the stream completes. A stream error
/// ends the run; the broken stream is not retried.
pub(crate) async fn stream_completion(
    provider: &dyn ModelProvider,
    request: &CompletionRequest,
    agent: &str,
    events: &EventSink,
) -> Result<Completion> {
    let mut stream = provider.stream(request).await?;
    let mut collector = StreamCollector::new();

    while let Some(event) = stream.next().await {
        if let StreamEvent::TextDelta { ref delta } = event {
            events.emit(RunEvent::Token {
                agent: agent.to_string(),
                delta: delta.clone(),
            });
        }
        collector.process_event(&event);

        if let Some(message) = collector.error() {
            tracing::warn!(agent = %agent, "model stream failed: {}", message);
            return Err(Error::Stream(message.to_string()));
        }
        if collector.is_done() {
            break;
        }
    }

    if !collector.is_done() {
        tracing::debug!(agent = %agent, "model stream ended without a done event");
    }
    Ok(collector.finish())
}

impl Runner {
    /// Run `agent` against the provider's streaming API, reporting progress
    /// on `events`.
    ///
    /// Behaves like [`Runner::execute`] and returns the same result; the
    /// last event sent is `Complete` or `Error`.
    pub async fn execute_streamed(
        &self,
        agent: &Agent,
        input: impl Into<RunInput>,
        context: &mut RunContext,
        events: &mpsc::UnboundedSender<RunEvent>,
    ) -> AgentResult {
        self.execute_inner(agent, input.into(), context, &EventSink::new(events.clone()))
            .await
    }

    /// Spawn a streamed run and return its events
    pub fn run_streamed(
        &self,
        agent: Agent,
        input: impl Into<RunInput>,
        context: RunContext,
    ) -> UnboundedReceiverStream<RunEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = self.clone();
        let input = input.into();

        tokio::spawn(async move {
            let mut context = context;
            let result = runner.execute_streamed(&agent, input, &mut context, &tx).await;
            tracing::debug!(
                agent = %agent.name(),
                success = result.success,
                "streamed run finished"
            );
        });

        UnboundedReceiverStream::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_test_model::{ScriptedProvider, ScriptedResponse};
    use baton_trace::{Tracer, TracingConfig};
    use serde_json::json;
    use std::sync::Arc;

    fn runner(provider: ScriptedProvider) -> Runner {
        Runner::new(Arc::new(provider)).with_tracer(Tracer::new(TracingConfig::default()))
    }

    #[tokio::test]
    async fn test_tokens_then_complete() {
        let runner = runner(ScriptedProvider::new([ScriptedResponse::text("Hello there")]));
        let agent = Agent::builder("Greeter").build();
        let events: Vec<RunEvent> = runner
            .run_streamed(agent, "hi", RunContext::new(""))
            .collect()
            .await;

        assert!(matches!(events[0], RunEvent::Start { .. }));
        assert!(matches!(events[1], RunEvent::AgentStart { .. }));
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Token { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello there");
        match events.last().unwrap() {
            RunEvent::Complete { result } => assert_eq!(result.content, "Hello there"),
            other => panic!("expected complete, got {:?}", other),
        }
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_stops_run() {
        let provider = Arc::new(ScriptedProvider::new([
            ScriptedResponse::stream_error("partial", "connection reset"),
            ScriptedResponse::text("never reached"),
        ]));
        let runner = Runner::new(provider.clone()).with_tracer(Tracer::disabled());
        let agent = Agent::builder("A").build();
        let events: Vec<RunEvent> = runner
            .run_streamed(agent, "hi", RunContext::new(""))
            .collect()
            .await;

        match events.last().unwrap() {
            RunEvent::Error { message, kind } => {
                assert!(message.contains("connection reset"));
                assert_eq!(*kind, Some(FailureKind::Stream));
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert!(!events.iter().any(|e| matches!(e, RunEvent::Complete { .. })));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fragmented_tool_arguments_reassembled() {
        let provider = Arc::new(
            ScriptedProvider::new([
                ScriptedResponse::tool_call("c1", "echo", json!({"text": "a fairly long argument"})),
                ScriptedResponse::text("done"),
            ])
            .with_chunk_size(3),
        );
        let runner = Runner::new(provider.clone()).with_tracer(Tracer::disabled());
        let echo = crate::FunctionTool::new(
            "echo",
            "Echo",
            json!({"type": "object", "required": ["text"]}),
            |args| async move { Ok(args["text"].as_str().unwrap_or_default().to_string()) },
        );
        let agent = Agent::builder("A").tool(echo).build();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ctx = RunContext::new("");
        let result = runner.execute_streamed(&agent, "go", &mut ctx, &tx).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.metadata.tool_calls[0].output, "a fairly long argument");

        drop(tx);
        let mut saw_tool_end = false;
        while let Some(event) = rx.recv().await {
            if let RunEvent::ToolEnd { is_error, .. } = event {
                assert!(!is_error);
                saw_tool_end = true;
            }
        }
        assert!(saw_tool_end);
    }

    #[test]
    fn test_event_serialization() {
        let event = RunEvent::Handoff {
            from: "Triage".into(),
            to: "Research".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "handoff");
        assert_eq!(json["to"], "Research");
    }
}
