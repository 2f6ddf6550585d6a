use baton_ai::{Completion, ToolCall};

/// One canned reply of a [`ScriptedProvider`](crate::ScriptedProvider)
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// A complete response
    Reply(Completion),
    /// `complete` fails / `stream` fails to open, with an API error
    Fail(String),
    /// Streams `partial_text`, then an error event. `complete` fails.
    StreamError { partial_text: String, message: String },
}

impl ScriptedResponse {
    /// Plain text answer
    pub fn text(text: impl Into<String>) -> Self {
        Self::Reply(Completion::text(text))
    }

    /// Tool calls only
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::Reply(Completion::tool_calls(calls))
    }

    /// A single tool call
    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self::tool_calls(vec![call(id, name, arguments)])
    }

    /// Text alongside tool calls
    pub fn text_and_tool_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut completion = Completion::tool_calls(calls);
        completion.text = Some(text.into());
        Self::Reply(completion)
    }

    /// Neither text nor tool calls
    pub fn empty() -> Self {
        Self::Reply(Completion::default())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    pub fn stream_error(partial_text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StreamError {
            partial_text: partial_text.into(),
            message: message.into(),
        }
    }
}

/// Build a tool call with JSON arguments
pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, arguments.to_string())
}

/// Build a tool call with raw argument text, which need not be valid JSON
pub fn raw_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall::new(id, name, arguments)
}
