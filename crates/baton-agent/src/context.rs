//! Per-run mutable state threaded through the call chain

use std::collections::HashMap;
use std::sync::Arc;

use baton_ai::Usage;
use baton_trace::{SpanHandle, SpanKind, TraceHandle};
use serde_json::{Map, Value};

use crate::{
    config::RunConfig,
    result::{ResultMetadata, ToolCallRecord},
};

/// Turn budget used when none is configured
pub const DEFAULT_MAX_TURNS: u32 = 25;

/// State owned by one run.
///
/// A context is passed by `&mut` down the call chain, including into
/// handoff targets, and is never shared between concurrent runs. The trace
/// handle it carries scopes the "current span" to this run.
#[derive(Debug)]
pub struct RunContext {
    handoff_tracker: Vec<String>,
    /// Turn budget for each agent loop in this run
    pub max_turns: u32,
    /// The run's initial input
    pub original_query: String,
    run_config: Arc<RunConfig>,
    fields: HashMap<String, Value>,
    trace: Option<TraceHandle>,
    tool_calls: Vec<ToolCallRecord>,
    usage: Usage,
    turns: u32,
}

impl RunContext {
    pub fn new(original_query: impl Into<String>) -> Self {
        Self {
            handoff_tracker: Vec::new(),
            max_turns: DEFAULT_MAX_TURNS,
            original_query: original_query.into(),
            run_config: Arc::new(RunConfig::default()),
            fields: HashMap::new(),
            trace: None,
            tool_calls: Vec::new(),
            usage: Usage::default(),
            turns: 0,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Attach a run config; its turn budget becomes the context's
    pub fn with_run_config(mut self, config: RunConfig) -> Self {
        self.max_turns = config.max_turns;
        self.run_config = Arc::new(config);
        self
    }

    /// Add a caller-supplied field (user identity, preferences, ...)
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_trace(mut self, trace: TraceHandle) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    /// Agents the run has passed through, in order
    pub fn handoff_tracker(&self) -> &[String] {
        &self.handoff_tracker
    }

    pub(crate) fn record_agent(&mut self, name: &str) {
        self.handoff_tracker.push(name.to_string());
    }

    pub fn trace(&self) -> Option<&TraceHandle> {
        self.trace.as_ref()
    }

    pub fn set_trace(&mut self, trace: TraceHandle) {
        self.trace = Some(trace);
    }

    pub(crate) fn take_trace(&mut self) -> Option<TraceHandle> {
        self.trace.take()
    }

    /// Open a span on this run's trace, or a no-op span without one
    pub fn open_span(&self, kind: SpanKind, name: impl Into<String>, data: Map<String, Value>) -> SpanHandle {
        match &self.trace {
            Some(trace) => trace.open_span_with(kind, name, data),
            None => SpanHandle::noop(),
        }
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    pub(crate) fn record_tool_call(&mut self, record: ToolCallRecord) {
        self.tool_calls.push(record);
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub(crate) fn add_usage(&mut self, usage: &Usage) {
        self.usage.add(usage);
    }

    /// Model calls made so far, across all agents
    pub fn turns(&self) -> u32 {
        self.turns
    }

    /// Start a new top-level run on `query`.
    ///
    /// Clears the previous run's bookkeeping; fields, config and an
    /// attached trace are kept.
    pub(crate) fn begin_run(&mut self, query: impl Into<String>) {
        self.original_query = query.into();
        self.handoff_tracker.clear();
        self.tool_calls.clear();
        self.usage = Usage::default();
        self.turns = 0;
    }

    pub(crate) fn add_turn(&mut self) {
        self.turns += 1;
    }

    /// Snapshot of the run's bookkeeping for a result
    pub(crate) fn metadata(&self) -> ResultMetadata {
        ResultMetadata {
            handoff_tracker: self.handoff_tracker.clone(),
            tool_calls: self.tool_calls.clone(),
            turns: self.turns,
            last_agent: self.handoff_tracker.last().cloned(),
            usage: self.usage,
            trace_id: self.trace.as_ref().map(|t| t.trace_id().to_string()),
            structured_output: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_sets_budget() {
        let ctx = RunContext::new("q").with_run_config(RunConfig::new().with_max_turns(3));
        assert_eq!(ctx.max_turns, 3);
        assert_eq!(ctx.run_config().max_turns, 3);
    }

    #[test]
    fn test_tracker_is_append_only_and_ordered() {
        let mut ctx = RunContext::new("q");
        ctx.record_agent("Triage");
        ctx.record_agent("Research");
        assert_eq!(ctx.handoff_tracker(), ["Triage", "Research"]);
        assert_eq!(ctx.metadata().last_agent.as_deref(), Some("Research"));
    }

    #[test]
    fn test_begin_run_clears_bookkeeping() {
        let mut ctx = RunContext::new("first").with_field("user_id", "u-1");
        ctx.record_agent("Triage");
        ctx.add_turn();
        ctx.begin_run("second");
        assert_eq!(ctx.original_query, "second");
        assert!(ctx.handoff_tracker().is_empty());
        assert_eq!(ctx.turns(), 0);
        assert!(ctx.field("user_id").is_some());
    }

    #[test]
    fn test_open_span_without_trace_is_noop() {
        let ctx = RunContext::new("q");
        assert!(ctx.open_span(SpanKind::Agent, "A", Map::new()).is_noop());
    }

    #[test]
    fn test_fields() {
        let mut ctx = RunContext::new("q").with_field("user_id", "u-1");
        ctx.set_field("locale", "en");
        assert_eq!(ctx.field("user_id").and_then(|v| v.as_str()), Some("u-1"));
        assert_eq!(ctx.fields().len(), 2);
    }
}
