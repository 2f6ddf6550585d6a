//! Trace processors (export sinks)

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use crate::{error::Result, span::Span, trace::Trace};

/// Receives finished traces.
///
/// Processors run after the trace is finished, in registration order. An
/// error or panic from one processor is logged and does not stop the others
/// or affect the run that produced the trace.
#[async_trait]
pub trait TraceProcessor: Send + Sync {
    /// Name used in log messages
    fn name(&self) -> &str;

    /// Called synchronously whenever a span exits
    fn on_span_end(&self, _span: &Span) {}

    /// Export a finished trace
    async fn process_trace(&self, trace: &Trace) -> Result<()>;
}

/// Keeps finished traces in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    traces: Mutex<Vec<Trace>>,
    span_ends: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All traces received so far
    pub fn traces(&self) -> Vec<Trace> {
        self.traces.lock().clone()
    }

    pub fn last(&self) -> Option<Trace> {
        self.traces.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.traces.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of span exits observed
    pub fn span_ends(&self) -> usize {
        self.span_ends.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.traces.lock().clear();
    }
}

#[async_trait]
impl TraceProcessor for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn on_span_end(&self, _span: &Span) {
        self.span_ends.fetch_add(1, Ordering::Relaxed);
    }

    async fn process_trace(&self, trace: &Trace) -> Result<()> {
        self.traces.lock().push(trace.clone());
        Ok(())
    }
}

/// Writes a summary of each trace to the `tracing` log
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TraceProcessor for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn process_trace(&self, trace: &Trace) -> Result<()> {
        tracing::info!(
            trace_id = %trace.trace_id,
            workflow = %trace.workflow_name,
            spans = trace.spans.len(),
            duration_ms = trace.duration_ms().unwrap_or_default(),
            "trace complete"
        );
        for span in &trace.spans {
            let depth = span_depth(trace, span);
            tracing::debug!(
                trace_id = %trace.trace_id,
                "{}{} [{}] {}ms{}",
                "  ".repeat(depth),
                span.name,
                span.kind.as_str(),
                span.duration_ms().unwrap_or_default(),
                span.error
                    .as_deref()
                    .map(|e| format!(" error: {}", e))
                    .unwrap_or_default()
            );
        }
        Ok(())
    }
}

fn span_depth(trace: &Trace, span: &Span) -> usize {
    let mut depth = 0;
    let mut parent = span.parent_id.as_deref();
    while let Some(id) = parent {
        depth += 1;
        parent = trace.span(id).and_then(|s| s.parent_id.as_deref());
    }
    depth
}

/// Appends each trace as one JSON line to a file
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TraceProcessor for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn process_trace(&self, trace: &Trace) -> Result<()> {
        let mut line = serde_json::to_string(trace)?;
        line.push('\n');

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
