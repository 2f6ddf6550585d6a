#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use baton_agent::{FunctionTool, Runner, ToolError};
use baton_test_model::ScriptedProvider;
use baton_trace::{MemorySink, Tracer, TracingConfig};
use serde_json::json;

/// Runner over a scripted provider with an in-memory trace sink
pub fn scripted_runner(provider: ScriptedProvider) -> (Runner, Arc<ScriptedProvider>, Arc<MemorySink>) {
    let provider = Arc::new(provider);
    let sink = Arc::new(MemorySink::new());
    let tracer = Tracer::new(TracingConfig::default()).with_processor(sink.clone());
    let runner = Runner::new(provider.clone()).with_tracer(tracer);
    (runner, provider, sink)
}

/// A tool that counts its invocations and echoes its `text` argument
pub fn counting_echo(counter: Arc<AtomicUsize>) -> FunctionTool {
    FunctionTool::new(
        "echo",
        "Echo the text back",
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        }),
        move |args| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(args["text"].as_str().unwrap_or_default().to_string())
            }
        },
    )
}

/// A tool whose execution always fails with "boom"
pub fn boom_tool() -> FunctionTool {
    FunctionTool::new("explode", "Always fails", json!({"type": "object"}), |_| async {
        Err(ToolError::new("boom"))
    })
}
