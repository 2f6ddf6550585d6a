//! Trace lifecycle and the per-run open-span stack

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    config::TracingConfig,
    processor::TraceProcessor,
    span::{Span, SpanKind, merge_data, redact_message},
};

/// The complete record of one top-level run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub workflow_name: String,
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub disabled: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Spans in the order they were opened
    pub spans: Vec<Span>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Trace {
    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    pub fn span(&self, span_id: &str) -> Option<&Span> {
        self.spans.iter().find(|s| s.span_id == span_id)
    }

    /// Direct children of `span_id`, or root spans when `None`
    pub fn children(&self, span_id: Option<&str>) -> Vec<&Span> {
        self.spans
            .iter()
            .filter(|s| s.parent_id.as_deref() == span_id)
            .collect()
    }

    pub fn spans_of_kind(&self, kind: SpanKind) -> Vec<&Span> {
        self.spans.iter().filter(|s| s.kind == kind).collect()
    }
}

/// Per-trace options supplied at start
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    /// Use this id instead of generating one
    pub trace_id: Option<String>,
    /// Links traces from the same conversation
    pub group_id: Option<String>,
    pub metadata: Map<String, Value>,
    /// Disable this trace regardless of the tracer config
    pub disabled: bool,
    /// Override the tracer's sensitive-data setting
    pub include_sensitive_data: Option<bool>,
}

/// Starts traces and owns the processors finished traces are exported to
#[derive(Clone, Default)]
pub struct Tracer {
    config: TracingConfig,
    processors: Vec<Arc<dyn TraceProcessor>>,
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("config", &self.config)
            .field(
                "processors",
                &self.processors.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Tracer {
    pub fn new(config: TracingConfig) -> Self {
        Self {
            config,
            processors: Vec::new(),
        }
    }

    /// Tracer configured from the environment toggles
    pub fn from_env() -> Self {
        Self::new(TracingConfig::from_env())
    }

    /// A tracer whose traces record nothing
    pub fn disabled() -> Self {
        Self::new(TracingConfig::disabled())
    }

    pub fn with_processor(mut self, processor: Arc<dyn TraceProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn add_processor(&mut self, processor: Arc<dyn TraceProcessor>) {
        self.processors.push(processor);
    }

    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    /// Start a new trace
    pub fn start_trace(&self, workflow_name: impl Into<String>, options: TraceOptions) -> TraceHandle {
        let workflow_name = workflow_name.into();
        let disabled = self.config.disabled || options.disabled;
        let trace_id = options
            .trace_id
            .unwrap_or_else(|| format!("trace_{}", uuid::Uuid::new_v4().simple()));

        tracing::debug!(trace_id = %trace_id, workflow = %workflow_name, disabled, "trace started");

        let trace = Trace {
            workflow_name,
            trace_id: trace_id.clone(),
            group_id: options.group_id,
            disabled,
            metadata: options.metadata,
            spans: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        };

        TraceHandle {
            inner: Arc::new(TraceInner {
                trace_id,
                disabled,
                include_sensitive_data: options
                    .include_sensitive_data
                    .unwrap_or(self.config.include_sensitive_data),
                processors: self.processors.clone(),
                state: Mutex::new(TraceState {
                    trace,
                    stack: Vec::new(),
                    index: HashMap::new(),
                    finished: false,
                }),
            }),
        }
    }
}

struct TraceState {
    trace: Trace,
    /// Ids of open spans, innermost last
    stack: Vec<String>,
    /// Span id to position in `trace.spans`
    index: HashMap<String, usize>,
    finished: bool,
}

struct TraceInner {
    trace_id: String,
    disabled: bool,
    include_sensitive_data: bool,
    processors: Vec<Arc<dyn TraceProcessor>>,
    state: Mutex<TraceState>,
}

/// Handle to one run's trace. Cloning is cheap and every clone refers to
/// the same trace and open-span stack.
#[derive(Clone)]
pub struct TraceHandle {
    inner: Arc<TraceInner>,
}

impl std::fmt::Debug for TraceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceHandle")
            .field("trace_id", &self.inner.trace_id)
            .field("disabled", &self.inner.disabled)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl TraceHandle {
    pub fn trace_id(&self) -> &str {
        &self.inner.trace_id
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.disabled
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().finished
    }

    pub fn include_sensitive_data(&self) -> bool {
        self.inner.include_sensitive_data
    }

    /// Id of the innermost open span
    pub fn current_span_id(&self) -> Option<String> {
        self.inner.state.lock().stack.last().cloned()
    }

    /// Number of currently open spans
    pub fn depth(&self) -> usize {
        self.inner.state.lock().stack.len()
    }

    /// Copy of the trace as recorded so far
    pub fn snapshot(&self) -> Trace {
        self.inner.state.lock().trace.clone()
    }

    /// Open a span as a child of the current span
    pub fn open_span(&self, kind: SpanKind, name: impl Into<String>) -> SpanHandle {
        self.open_span_with(kind, name, Map::new())
    }

    /// Open a span with initial data
    pub fn open_span_with(
        &self,
        kind: SpanKind,
        name: impl Into<String>,
        data: Map<String, Value>,
    ) -> SpanHandle {
        if self.inner.disabled {
            return SpanHandle::noop();
        }

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let name = name.into();
        if state.finished {
            tracing::debug!(
                trace_id = %self.inner.trace_id,
                "span '{}' opened after trace finished; ignoring",
                name
            );
            return SpanHandle::noop();
        }

        let parent_id = state.stack.last().cloned();
        let mut span = Span::new(&self.inner.trace_id, parent_id, kind, name);
        merge_data(&mut span.data, data, self.inner.include_sensitive_data);
        let span_id = span.span_id.clone();

        state.index.insert(span_id.clone(), state.trace.spans.len());
        state.trace.spans.push(span);
        state.stack.push(span_id.clone());

        SpanHandle {
            trace: Some(self.clone()),
            span_id: Some(span_id),
            closed: AtomicBool::new(false),
        }
    }

    /// Finish the trace and export it.
    ///
    /// Closes any spans still open, stamps the end time and hands the trace
    /// to every processor. Only the first call has any effect; it returns
    /// `true`, later calls return `false`.
    pub async fn finish(&self) -> bool {
        let trace = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.finished {
                tracing::debug!(trace_id = %self.inner.trace_id, "trace already finished");
                return false;
            }
            state.finished = true;

            let now = Utc::now();
            while let Some(span_id) = state.stack.pop() {
                if let Some(&i) = state.index.get(&span_id) {
                    let span = &mut state.trace.spans[i];
                    if span.ended_at.is_none() {
                        span.ended_at = Some(now);
                    }
                }
            }
            state.trace.ended_at = Some(now);
            state.trace.clone()
        };

        if self.inner.disabled {
            return true;
        }

        tracing::debug!(
            trace_id = %trace.trace_id,
            spans = trace.spans.len(),
            duration_ms = trace.duration_ms().unwrap_or_default(),
            "trace finished"
        );

        for processor in &self.inner.processors {
            match AssertUnwindSafe(processor.process_trace(&trace))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(
                    trace_id = %trace.trace_id,
                    "Trace processor '{}' failed: {}",
                    processor.name(),
                    e
                ),
                Err(_) => tracing::warn!(
                    trace_id = %trace.trace_id,
                    "Trace processor '{}' panicked",
                    processor.name()
                ),
            }
        }
        true
    }

    fn update_span(&self, span_id: &str, f: impl FnOnce(&mut Span, bool)) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.finished {
            return;
        }
        if let Some(&i) = state.index.get(span_id) {
            f(&mut state.trace.spans[i], self.inner.include_sensitive_data);
        }
    }
}

/// Handle to one open span.
///
/// Dropping the handle exits the span if it has not been exited yet, so a
/// span opened at the top of a scope is closed on every path out of it.
pub struct SpanHandle {
    trace: Option<TraceHandle>,
    span_id: Option<String>,
    closed: AtomicBool,
}

impl std::fmt::Debug for SpanHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanHandle")
            .field("span_id", &self.span_id)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl SpanHandle {
    /// A handle that records nothing
    pub fn noop() -> Self {
        Self {
            trace: None,
            span_id: None,
            closed: AtomicBool::new(true),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.span_id.is_none()
    }

    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }

    /// Merge fields into the span's data
    pub fn add_data(&self, partial: Map<String, Value>) {
        if let (Some(trace), Some(span_id)) = (&self.trace, &self.span_id) {
            trace.update_span(span_id, |span, include_sensitive| {
                merge_data(&mut span.data, partial, include_sensitive)
            });
        }
    }

    /// Set a single data field
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let mut partial = Map::new();
        partial.insert(key.to_string(), value.into());
        self.add_data(partial);
    }

    /// Record a failure on the span
    pub fn record_error(&self, message: impl Into<String>) {
        if let (Some(trace), Some(span_id)) = (&self.trace, &self.span_id) {
            let message = message.into();
            trace.update_span(span_id, |span, _| span.error = Some(message));
        }
    }

    /// Record a failure whose message may quote model or tool payloads.
    ///
    /// Kept verbatim only when the trace includes sensitive data; otherwise
    /// only its length is recorded.
    pub fn record_sensitive_error(&self, message: impl Into<String>) {
        if let (Some(trace), Some(span_id)) = (&self.trace, &self.span_id) {
            let message = message.into();
            trace.update_span(span_id, |span, include_sensitive| {
                span.error = Some(if include_sensitive {
                    message
                } else {
                    redact_message(&message)
                });
            });
        }
    }

    /// Close the span and make its parent current again.
    ///
    /// Only the innermost open span can exit. Exiting any other span is a
    /// no-op that leaves the stack untouched and returns `false`; the span
    /// can still be exited later once the spans above it are closed.
    pub fn exit(&self) -> bool {
        let (Some(trace), Some(span_id)) = (&self.trace, &self.span_id) else {
            return false;
        };
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let ended = {
            let mut guard = trace.inner.state.lock();
            let state = &mut *guard;
            if state.finished {
                self.closed.store(true, Ordering::Release);
                return false;
            }
            if state.stack.last() != Some(span_id) {
                tracing::debug!(
                    trace_id = %trace.inner.trace_id,
                    "span {} exited while not innermost; ignoring",
                    span_id
                );
                return false;
            }
            state.stack.pop();
            let Some(&i) = state.index.get(span_id) else {
                return false;
            };
            let span = &mut state.trace.spans[i];
            span.ended_at = Some(Utc::now());
            span.clone()
        };

        self.closed.store(true, Ordering::Release);
        for processor in &trace.inner.processors {
            processor.on_span_end(&ended);
        }
        true
    }
}

impl Drop for SpanHandle {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            self.exit();
        }
    }
}
