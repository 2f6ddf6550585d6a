//! The turn loop: model calls, tool execution and handoffs

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use baton_ai::{Completion, CompletionRequest, Message, ModelProvider, ToolCall};
use baton_trace::{SpanHandle, SpanKind, TraceHandle, Tracer};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value, json};

use crate::{
    agent::Agent,
    context::RunContext,
    error::{Error, Result},
    handoff::{Handoff, HandoffInput, HandoffMatch},
    result::{AgentResult, ToolCallRecord},
    streaming::{self, EventSink, RunEvent},
    tool::ToolResult,
};

/// Input to a run
#[derive(Debug, Clone)]
pub enum RunInput {
    /// A single user message
    Text(String),
    /// A prepared conversation
    Messages(Vec<Message>),
}

impl RunInput {
    /// Blank text, or a conversation without any non-blank message
    pub fn is_empty(&self) -> bool {
        match self {
            RunInput::Text(text) => text.trim().is_empty(),
            RunInput::Messages(messages) => !messages
                .iter()
                .any(|m| m.text().is_some_and(|t| !t.trim().is_empty()) || !m.tool_calls().is_empty()),
        }
    }

    /// Text recorded as the run's original query
    pub fn query_text(&self) -> String {
        match self {
            RunInput::Text(text) => text.clone(),
            RunInput::Messages(messages) => messages
                .iter()
                .rev()
                .find(|m| m.is_user())
                .and_then(|m| m.text())
                .unwrap_or_default()
                .to_string(),
        }
    }

    pub fn into_messages(self) -> Vec<Message> {
        match self {
            RunInput::Text(text) => vec![Message::user(text)],
            RunInput::Messages(messages) => messages,
        }
    }
}

impl From<&str> for RunInput {
    fn from(text: &str) -> Self {
        RunInput::Text(text.to_string())
    }
}

impl From<String> for RunInput {
    fn from(text: String) -> Self {
        RunInput::Text(text)
    }
}

impl From<Vec<Message>> for RunInput {
    fn from(messages: Vec<Message>) -> Self {
        RunInput::Messages(messages)
    }
}

/// Final output of one agent loop
#[derive(Debug, Clone)]
pub(crate) struct Completed {
    pub content: String,
    pub structured_output: Option<Value>,
}

/// What a turn decided
enum Step {
    Final(Completed),
    Continue,
}

/// Drives agents against a model provider.
///
/// A runner is cheap to clone and holds no per-run state; everything a run
/// mutates lives in its [`RunContext`].
#[derive(Clone)]
pub struct Runner {
    provider: Arc<dyn ModelProvider>,
    tracer: Tracer,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("provider", &self.provider.name())
            .field("tracer", &self.tracer)
            .finish()
    }
}

impl Runner {
    /// Create a runner; tracing is configured from the environment
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            tracer: Tracer::from_env(),
        }
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    /// Run `agent` on `input` until it produces a final answer, hands off to
    /// an agent that does, or fails.
    ///
    /// Never returns an `Err`: failures are reported through
    /// [`AgentResult::success`] and [`AgentResult::failure`]. When the
    /// context carries no trace, one is started for the run and finished
    /// before returning, on every path including panics.
    pub async fn execute(
        &self,
        agent: &Agent,
        input: impl Into<RunInput>,
        context: &mut RunContext,
    ) -> AgentResult {
        self.execute_inner(agent, input.into(), context, &EventSink::none())
            .await
    }

    /// Like [`Runner::execute`], giving up after `duration`.
    ///
    /// On timeout the run future is dropped: an in-flight model call or tool
    /// is abandoned wherever it was suspended.
    pub async fn execute_with_timeout(
        &self,
        agent: &Agent,
        input: impl Into<RunInput>,
        context: &mut RunContext,
        duration: Duration,
    ) -> AgentResult {
        let input = input.into();
        if input.is_empty() {
            return AgentResult::failure(&Error::EmptyInput, context.metadata());
        }

        // Own the trace here so it is finished even when the run is dropped.
        let owned = self.ensure_trace(context);
        let outcome = tokio::time::timeout(
            duration,
            self.execute_inner(agent, input, context, &EventSink::none()),
        )
        .await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(agent = %agent.name(), "run timed out after {:?}", duration);
                let error = Error::Timeout(duration);
                if let Some(trace) = context.trace() {
                    trace
                        .open_span(SpanKind::Custom, "timeout")
                        .record_error(error.to_string());
                }
                AgentResult::failure(&error, context.metadata())
            }
        };

        self.finish_owned(owned, context).await;
        result
    }

    /// Start a trace for the run unless the context already carries one.
    /// Returns the trace when this call started it.
    pub(crate) fn ensure_trace(&self, context: &mut RunContext) -> Option<TraceHandle> {
        if context.trace().is_some() {
            return None;
        }
        let config = context.run_config();
        let trace = self
            .tracer
            .start_trace(config.workflow_name.clone(), config.trace_options());
        context.set_trace(trace.clone());
        Some(trace)
    }

    /// Finish a trace started by [`Runner::ensure_trace`] and detach it
    pub(crate) async fn finish_owned(&self, owned: Option<TraceHandle>, context: &mut RunContext) {
        if let Some(trace) = owned {
            trace.finish().await;
            context.take_trace();
        }
    }

    pub(crate) async fn execute_inner(
        &self,
        agent: &Agent,
        input: RunInput,
        context: &mut RunContext,
        events: &EventSink,
    ) -> AgentResult {
        if input.is_empty() {
            tracing::warn!(agent = %agent.name(), "rejecting empty input");
            let error = Error::EmptyInput;
            let result = AgentResult::failure(&error, context.metadata());
            events.emit(RunEvent::error(&error));
            return result;
        }
        if !events.is_nested() {
            context.begin_run(input.query_text());
        }

        let owned = self.ensure_trace(context);
        if context.handoff_tracker().is_empty() {
            context.record_agent(agent.name());
        }
        events.emit(RunEvent::Start {
            agent: agent.name().to_string(),
            trace_id: context.trace().map(|t| t.trace_id().to_string()),
        });

        let outcome = AssertUnwindSafe(self.run_loop(agent, input.into_messages(), context, events))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(done)) => {
                let mut metadata = context.metadata();
                metadata.structured_output = done.structured_output;
                AgentResult::success(done.content, metadata)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    agent = %agent.name(),
                    kind = ?e.kind(),
                    "run failed: {}",
                    e
                );
                AgentResult::failure(&e, context.metadata())
            }
            Err(panic) => {
                tracing::error!(agent = %agent.name(), "run panicked; finishing trace");
                self.finish_owned(owned, context).await;
                std::panic::resume_unwind(panic);
            }
        };

        self.finish_owned(owned, context).await;

        if result.success {
            events.emit(RunEvent::Complete {
                result: Box::new(result.clone()),
            });
        } else {
            events.emit(RunEvent::Error {
                message: result.error.clone().unwrap_or_default(),
                kind: result.failure,
            });
        }
        result
    }

    /// One agent's loop. Handoff targets run through here as well.
    pub(crate) fn run_loop<'a>(
        &'a self,
        agent: &'a Agent,
        mut messages: Vec<Message>,
        context: &'a mut RunContext,
        events: &'a EventSink,
    ) -> BoxFuture<'a, Result<Completed>> {
        Box::pin(async move {
            let span = context.open_span(SpanKind::Agent, agent.name(), agent_span_data(agent));
            events.emit(RunEvent::AgentStart {
                agent: agent.name().to_string(),
            });
            tracing::debug!(agent = %agent.name(), "agent started");

            let outcome = self.turns(agent, &mut messages, context, events).await;
            match &outcome {
                Ok(done) => span.set("output", done.content.clone()),
                Err(e) => record_run_error(&span, e),
            }
            span.exit();
            outcome
        })
    }

    async fn turns(
        &self,
        agent: &Agent,
        messages: &mut Vec<Message>,
        context: &mut RunContext,
        events: &EventSink,
    ) -> Result<Completed> {
        let max_turns = context.max_turns;
        let mut turn = 0u32;

        loop {
            if turn >= max_turns {
                tracing::warn!(agent = %agent.name(), max_turns, "turn budget exhausted");
                return Err(Error::MaxTurnsExceeded { max_turns });
            }
            turn += 1;
            context.add_turn();
            tracing::debug!(agent = %agent.name(), turn, "turn started");

            let request = build_request(agent, messages, context);
            let completion = self.call_model(agent, &request, context, events).await?;

            match self
                .dispatch(agent, completion, messages, context, events)
                .await?
            {
                Step::Final(done) => return Ok(done),
                Step::Continue => {}
            }
        }
    }

    async fn call_model(
        &self,
        agent: &Agent,
        request: &CompletionRequest,
        context: &mut RunContext,
        events: &EventSink,
    ) -> Result<Completion> {
        let mut data = Map::new();
        data.insert("model".into(), json!(request.model));
        data.insert(
            "input".into(),
            serde_json::to_value(&request.messages).unwrap_or_default(),
        );
        let span = context.open_span(SpanKind::Generation, "generation", data);

        let outcome = if events.is_streaming() {
            streaming::stream_completion(self.provider.as_ref(), request, agent.name(), events).await
        } else {
            self.provider
                .complete(request)
                .await
                .map_err(Error::from)
        };

        match &outcome {
            Ok(completion) => {
                context.add_usage(&completion.usage);
                span.set("usage", json!(completion.usage));
                span.set("output", json!({
                    "text": completion.text,
                    "tool_calls": completion.tool_calls,
                }));
                tracing::debug!(
                    agent = %agent.name(),
                    tool_calls = completion.tool_calls.len(),
                    input_tokens = completion.usage.input,
                    output_tokens = completion.usage.output,
                    "model responded"
                );
            }
            Err(e) => span.record_error(e.to_string()),
        }
        span.exit();
        outcome
    }

    /// Classify a response and act on it
    async fn dispatch(
        &self,
        agent: &Agent,
        completion: Completion,
        messages: &mut Vec<Message>,
        context: &mut RunContext,
        events: &EventSink,
    ) -> Result<Step> {
        if !completion.has_tool_calls() {
            let Some(text) = completion.non_empty_text() else {
                return Err(Error::MalformedResponse);
            };
            let structured_output = agent.parse_output(text).map_err(Error::OutputSchema)?;
            messages.push(Message::assistant_text(text));
            return Ok(Step::Final(Completed {
                content: text.to_string(),
                structured_output,
            }));
        }

        let text = completion.non_empty_text().map(str::to_string);
        let calls = completion.tool_calls;
        messages.push(Message::assistant(text, calls.clone()));

        for (i, call) in calls.iter().enumerate() {
            match agent.resolve_call(&call.name) {
                HandoffMatch::Target(target) => {
                    let arguments = match call.parse_arguments() {
                        Ok(arguments) => arguments,
                        Err(e) => {
                            let result =
                                ToolResult::error(format!("Invalid handoff arguments: {}", e));
                            self.push_call_result(agent, call, result, messages, context, events);
                            continue;
                        }
                    };
                    if let Some(err) = target.validate_input(&arguments) {
                        self.push_call_result(agent, call, ToolResult::error(err), messages, context, events);
                        continue;
                    }

                    messages.push(Message::tool_result(
                        &call.id,
                        &call.name,
                        json!({ "assistant": target.agent_name() }).to_string(),
                        false,
                    ));
                    for skipped in &calls[i + 1..] {
                        tracing::debug!(
                            agent = %agent.name(),
                            tool = %skipped.name,
                            "skipping call after handoff"
                        );
                        let result = ToolResult::error(format!(
                            "Skipped: control was handed off to {}",
                            target.agent_name()
                        ));
                        messages.push(Message::tool_result(
                            &skipped.id,
                            &skipped.name,
                            result.content,
                            true,
                        ));
                    }

                    let done = self
                        .hand_off(agent, target, arguments, messages, context, events)
                        .await?;
                    return Ok(Step::Final(done));
                }
                HandoffMatch::Unresolved(name) => {
                    tracing::warn!(agent = %agent.name(), target = %name, "unknown handoff target");
                    let result = ToolResult::error(format!("Handoff target not found: {}", name));
                    self.push_call_result(agent, call, result, messages, context, events);
                }
                HandoffMatch::NotHandoff => {
                    let result = self.run_tool(agent, call, context, events).await;
                    messages.push(Message::tool_result(
                        &call.id,
                        &call.name,
                        result.content,
                        result.is_error,
                    ));
                }
            }
        }

        Ok(Step::Continue)
    }

    /// Record a call answered without running a tool
    fn push_call_result(
        &self,
        agent: &Agent,
        call: &ToolCall,
        result: ToolResult,
        messages: &mut Vec<Message>,
        context: &mut RunContext,
        events: &EventSink,
    ) {
        events.emit(RunEvent::ToolStart {
            agent: agent.name().to_string(),
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
        self.record_call(agent, call, &result, context, events);
        messages.push(Message::tool_result(
            &call.id,
            &call.name,
            result.content,
            result.is_error,
        ));
    }

    fn record_call(
        &self,
        agent: &Agent,
        call: &ToolCall,
        result: &ToolResult,
        context: &mut RunContext,
        events: &EventSink,
    ) {
        context.record_tool_call(ToolCallRecord {
            agent: agent.name().to_string(),
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            output: result.content.clone(),
            is_error: result.is_error,
        });
        events.emit(RunEvent::ToolEnd {
            agent: agent.name().to_string(),
            call_id: call.id.clone(),
            name: call.name.clone(),
            output: result.content.clone(),
            is_error: result.is_error,
        });
    }

    /// Execute one ordinary tool call. Every failure becomes an error result.
    async fn run_tool(
        &self,
        agent: &Agent,
        call: &ToolCall,
        context: &mut RunContext,
        events: &EventSink,
    ) -> ToolResult {
        events.emit(RunEvent::ToolStart {
            agent: agent.name().to_string(),
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });

        let mut data = Map::new();
        data.insert("arguments".into(), json!(call.arguments));
        let span = context.open_span(SpanKind::Function, &call.name, data);

        let result = match agent.find_tool(&call.name) {
            None => ToolResult::error(format!("Tool not found: {}", call.name)),
            Some(tool) => match call.parse_arguments() {
                Err(e) => ToolResult::error(format!("Invalid JSON arguments: {}", e)),
                Ok(arguments) => match agent.validate_arguments(&call.name, &arguments) {
                    Some(err) => ToolResult::error(err),
                    None => match AssertUnwindSafe(tool.execute(arguments)).catch_unwind().await {
                        Ok(Ok(output)) => ToolResult::text(output),
                        Ok(Err(e)) => ToolResult::error(e),
                        Err(_) => ToolResult::error(format!("Tool '{}' panicked", call.name)),
                    },
                },
            },
        };

        if result.is_error {
            tracing::debug!(agent = %agent.name(), tool = %call.name, "tool failed: {}", result.content);
            span.record_sensitive_error(result.content.clone());
        } else {
            tracing::debug!(agent = %agent.name(), tool = %call.name, "tool succeeded");
        }
        span.set("result", result.content.clone());
        span.exit();

        self.record_call(agent, call, &result, context, events);
        result
    }

    /// Delegate the rest of the run to the handoff's target
    async fn hand_off(
        &self,
        agent: &Agent,
        handoff: &Handoff,
        arguments: Value,
        messages: &mut Vec<Message>,
        context: &mut RunContext,
        events: &EventSink,
    ) -> Result<Completed> {
        let target = handoff.agent();
        tracing::info!(from = %agent.name(), to = %target.name(), "handing off");

        let mut data = Map::new();
        data.insert("from_agent".into(), json!(agent.name()));
        data.insert("to_agent".into(), json!(target.name()));
        let span = context.open_span(
            SpanKind::Handoff,
            format!("{} -> {}", agent.name(), target.name()),
            data,
        );
        events.emit(RunEvent::Handoff {
            from: agent.name().to_string(),
            to: target.name().to_string(),
        });

        let input = HandoffInput {
            input: context.original_query.clone(),
            history: std::mem::take(messages),
        };
        let input = match agent.handoff_filter(handoff, context.run_config()) {
            Some(filter) => filter(input),
            None => input,
        };

        context.record_agent(target.name());
        handoff.notify(context, &arguments);

        let outcome = self
            .run_loop(target, input.into_messages(), context, events)
            .await;
        if let Err(e) = &outcome {
            record_run_error(&span, e);
        }
        span.exit();
        outcome
    }
}

fn record_run_error(span: &SpanHandle, error: &Error) {
    if error.quotes_payload() {
        span.record_sensitive_error(error.to_string());
    } else {
        span.record_error(error.to_string());
    }
}

fn build_request(agent: &Agent, messages: &[Message], context: &RunContext) -> CompletionRequest {
    let config = context.run_config();
    CompletionRequest {
        model: agent.effective_model(config),
        system_prompt: agent.resolve_instructions(context),
        messages: messages.to_vec(),
        tools: agent.tool_specs(),
        settings: agent.effective_settings(config),
    }
}

fn agent_span_data(agent: &Agent) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("tools".into(), json!(agent.tool_names()));
    data.insert(
        "handoffs".into(),
        json!(
            agent
                .handoffs()
                .iter()
                .map(|h| h.agent_name())
                .collect::<Vec<_>>()
        ),
    );
    if agent.output_schema().is_some() {
        data.insert("output_type".into(), json!("json"));
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{FunctionTool, ToolError};
    use baton_test_model::{ScriptedProvider, ScriptedResponse, call};
    use baton_trace::{MemorySink, TracingConfig};

    fn runner(provider: ScriptedProvider) -> (Runner, Arc<ScriptedProvider>, Arc<MemorySink>) {
        let provider = Arc::new(provider);
        let sink = Arc::new(MemorySink::new());
        let runner = Runner::new(provider.clone())
            .with_tracer(Tracer::new(TracingConfig::default()).with_processor(sink.clone()));
        (runner, provider, sink)
    }

    fn failing_tool() -> FunctionTool {
        FunctionTool::new("explode", "Always fails", json!({"type": "object"}), |_| async {
            Err(ToolError::new("boom"))
        })
    }

    #[test]
    fn test_run_input_emptiness() {
        assert!(RunInput::from("   ").is_empty());
        assert!(RunInput::from(Vec::<Message>::new()).is_empty());
        assert!(!RunInput::from(vec![Message::user("hi")]).is_empty());
        assert_eq!(
            RunInput::from(vec![Message::user("a"), Message::assistant_text("b"), Message::user("c")])
                .query_text(),
            "c"
        );
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let (runner, provider, _) = runner(ScriptedProvider::new([ScriptedResponse::text("4")]));
        let agent = Agent::builder("Math").instructions("Answer briefly.").build();
        let mut ctx = RunContext::new("");
        let result = runner.execute(&agent, "What is 2+2?", &mut ctx).await;

        assert!(result.success);
        assert_eq!(result.content, "4");
        assert_eq!(result.metadata.turns, 1);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(ctx.original_query, "What is 2+2?");

        let request = provider.last_request().unwrap();
        assert_eq!(request.system_prompt.as_deref(), Some("Answer briefly."));
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_never_calls_model() {
        let (runner, provider, sink) = runner(ScriptedProvider::new([ScriptedResponse::text("x")]));
        let agent = Agent::builder("A").build();
        let mut ctx = RunContext::new("");
        let result = runner.execute(&agent, "", &mut ctx).await;

        assert!(!result.success);
        assert_eq!(result.failure, Some(crate::FailureKind::InvalidInput));
        assert_eq!(provider.call_count(), 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_tool_error_is_fed_back() {
        let (runner, provider, _) = runner(ScriptedProvider::new([
            ScriptedResponse::tool_call("c1", "explode", json!({})),
            ScriptedResponse::text("recovered"),
        ]));
        let agent = Agent::builder("A").tool(failing_tool()).build();
        let mut ctx = RunContext::new("");
        let result = runner.execute(&agent, "go", &mut ctx).await;

        assert!(result.success);
        assert_eq!(result.content, "recovered");
        let second = &provider.requests()[1];
        let tool_msg = second.messages.iter().find(|m| m.is_tool_result()).unwrap();
        assert_eq!(tool_msg.text(), Some("Error: boom"));
        assert!(result.metadata.tool_calls[0].is_error);
    }

    #[tokio::test]
    async fn test_whitespace_only_text_is_malformed() {
        let (runner, _, _) = runner(ScriptedProvider::new([ScriptedResponse::text("  \n")]));
        let agent = Agent::builder("A").build();
        let result = runner.execute(&agent, "hi", &mut RunContext::new("")).await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(crate::FailureKind::MalformedResponse));
    }

    #[tokio::test]
    async fn test_provider_error_fails_run() {
        let (runner, provider, sink) =
            runner(ScriptedProvider::new([ScriptedResponse::fail("rate limited")]));
        let agent = Agent::builder("A").build();
        let result = runner.execute(&agent, "hi", &mut RunContext::new("")).await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(crate::FailureKind::Provider));
        assert_eq!(provider.call_count(), 1);

        let trace = sink.last().unwrap();
        let agent_span = &trace.spans_of_kind(SpanKind::Agent)[0];
        assert!(agent_span.error.as_deref().unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_output_schema_enforced() {
        let (runner, _, _) = runner(ScriptedProvider::new([
            ScriptedResponse::text(r#"{"answer": 4}"#),
            ScriptedResponse::text("four"),
        ]));
        let agent = Agent::builder("A")
            .output_schema(json!({"type": "object", "required": ["answer"]}))
            .build();

        let ok = runner.execute(&agent, "2+2", &mut RunContext::new("")).await;
        assert!(ok.success);
        assert_eq!(ok.metadata.structured_output, Some(json!({"answer": 4})));

        let bad = runner.execute(&agent, "2+2", &mut RunContext::new("")).await;
        assert_eq!(bad.failure, Some(crate::FailureKind::OutputSchema));
    }

    #[tokio::test]
    async fn test_timeout_finishes_trace() {
        let provider = ScriptedProvider::new([ScriptedResponse::text("late")])
            .with_delay(Duration::from_millis(200));
        let (runner, _, sink) = runner(provider);
        let agent = Agent::builder("Slow").build();
        let mut ctx = RunContext::new("");
        let result = runner
            .execute_with_timeout(&agent, "hi", &mut ctx, Duration::from_millis(10))
            .await;

        assert!(!result.success);
        assert_eq!(result.failure, Some(crate::FailureKind::Timeout));
        assert_eq!(sink.len(), 1);
        assert!(ctx.trace().is_none());
    }

    #[tokio::test]
    async fn test_model_and_settings_resolved_per_request() {
        let (runner, provider, _) = runner(ScriptedProvider::new([ScriptedResponse::text("ok")]));
        let agent = Agent::builder("A")
            .model("agent-model")
            .temperature(0.1)
            .dynamic_instructions(|ctx: &RunContext| format!("User is {}", ctx.field("user").and_then(|v| v.as_str()).unwrap_or("?")))
            .build();
        let mut ctx = RunContext::new("")
            .with_run_config(crate::RunConfig::new().with_model("run-model"))
            .with_field("user", "ada");
        runner.execute(&agent, "hi", &mut ctx).await;

        let request = provider.last_request().unwrap();
        assert_eq!(request.model, "run-model");
        assert_eq!(request.settings.temperature, Some(0.1));
        assert_eq!(request.system_prompt.as_deref(), Some("User is ada"));
    }

    #[tokio::test]
    async fn test_usage_summed_over_turns() {
        let (runner, _, _) = runner(ScriptedProvider::new([
            ScriptedResponse::tool_call("c1", "missing", json!({})),
            ScriptedResponse::text("done"),
        ]));
        let agent = Agent::builder("A").build();
        let result = runner.execute(&agent, "hi", &mut RunContext::new("")).await;
        assert_eq!(result.metadata.usage.input, 20);
        assert_eq!(result.metadata.usage.output, 10);
        assert_eq!(result.metadata.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_tool_and_bad_json_are_per_call_errors() {
        let (runner, provider, _) = runner(ScriptedProvider::new([
            ScriptedResponse::tool_calls(vec![
                call("c1", "nope", json!({})),
                baton_test_model::raw_call("c2", "explode", "{not json"),
            ]),
            ScriptedResponse::text("fine"),
        ]));
        let agent = Agent::builder("A").tool(failing_tool()).build();
        let result = runner.execute(&agent, "hi", &mut RunContext::new("")).await;
        assert!(result.success);

        let tool_msgs: Vec<_> = provider.requests()[1]
            .messages
            .iter()
            .filter(|m| m.is_tool_result())
            .filter_map(|m| m.text().map(str::to_string))
            .collect();
        assert_eq!(tool_msgs[0], "Error: Tool not found: nope");
        assert!(tool_msgs[1].starts_with("Error: Invalid JSON arguments"));
    }
}
