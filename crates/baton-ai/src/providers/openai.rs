//! OpenAI-compatible Chat Completions provider

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use super::ModelProvider;
use crate::{
    error::{Error, Result},
    stream::{StreamEvent, StreamEventStream},
    types::{Completion, CompletionRequest, FinishReason, Message, ToolCall, Usage},
};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat Completions API client.
///
/// Works against any server that speaks the same wire format by pointing
/// `base_url` at it.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from `OPENAI_API_KEY`, honouring `OPENAI_BASE_URL` if set
    pub fn from_env() -> Result<Self> {
        let api_key = super::get_api_key(None, "OPENAI_API_KEY")?;
        let mut provider = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            provider = provider.with_base_url(base_url);
        }
        Ok(provider)
    }

    /// Point the provider at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| Error::InvalidConfig(format!("Invalid API key header: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = build_request(request, false);
        tracing::debug!(model = %request.model, messages = body.messages.len(), "chat completion request");

        let response = self
            .client
            .post(self.url())
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &text));
        }

        let parsed: ChatResponse = response.json().await?;
        parse_response(parsed)
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<StreamEventStream> {
        let body = build_request(request, true);
        tracing::debug!(model = %request.model, messages = body.messages.len(), "chat completion stream");

        let request_builder = self
            .client
            .post(self.url())
            .headers(self.headers()?)
            .json(&body);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }
}

fn api_error(status: u16, body: &str) -> Error {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => Error::api(
            envelope
                .error
                .error_type
                .unwrap_or_else(|| format!("http_{}", status)),
            envelope.error.message,
        ),
        Err(_) => Error::api(format!("http_{}", status), body),
    }
}

fn build_request(request: &CompletionRequest, stream: bool) -> OpenAIRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(ref system_prompt) = request.system_prompt {
        messages.push(OpenAIMessage::text("system", system_prompt.clone()));
    }
    messages.extend(request.messages.iter().map(convert_message));

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(
            request
                .tools
                .iter()
                .map(|t| OpenAITool {
                    tool_type: "function".to_string(),
                    function: OpenAIFunction {
                        name: t.name.clone(),
                        description: Some(t.description.clone()),
                        parameters: Some(t.parameters.clone()),
                    },
                })
                .collect(),
        )
    };

    let settings = &request.settings;
    OpenAIRequest {
        model: request.model.clone(),
        messages,
        stream,
        stream_options: stream.then_some(StreamOptions {
            include_usage: true,
        }),
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
        top_p: settings.top_p,
        stop: if settings.stop_sequences.is_empty() {
            None
        } else {
            Some(settings.stop_sequences.clone())
        },
        tool_choice: tools.as_ref().map(|_| serde_json::json!("auto")),
        tools,
        extra: settings.extra.clone(),
    }
}

fn convert_message(msg: &Message) -> OpenAIMessage {
    match msg {
        Message::System { content } => OpenAIMessage::text("system", content.clone()),
        Message::User { content, .. } => OpenAIMessage::text("user", content.clone()),
        Message::Assistant {
            content,
            tool_calls,
            ..
        } => OpenAIMessage {
            role: "assistant".to_string(),
            content: content.clone(),
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(
                    tool_calls
                        .iter()
                        .map(|c| OpenAIToolCall {
                            id: c.id.clone(),
                            call_type: "function".to_string(),
                            function: OpenAIFunctionCall {
                                name: c.name.clone(),
                                arguments: c.arguments.clone(),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: None,
        },
        Message::Tool {
            tool_call_id,
            content,
            ..
        } => OpenAIMessage {
            role: "tool".to_string(),
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

fn parse_response(response: ChatResponse) -> Result<Completion> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnexpectedResponse("response contained no choices".into()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| ToolCall::new(c.id, c.function.name, c.function.arguments))
        .collect();

    Ok(Completion {
        text: choice.message.content,
        tool_calls,
        usage: response.usage.map(Usage::from).unwrap_or_default(),
        finish_reason: choice.finish_reason.as_deref().and_then(FinishReason::parse),
    })
}

fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = StreamEvent> {
    stream! {
        let mut finish_reason: Option<FinishReason> = None;
        let mut usage = Usage::default();

        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }

                    let chunk = match serde_json::from_str::<StreamChunk>(&msg.data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            event_source.close();
                            yield StreamEvent::Error {
                                message: format!("Failed to parse chunk: {}", e),
                            };
                            return;
                        }
                    };

                    for choice in chunk.choices {
                        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                            yield StreamEvent::TextDelta { delta: content };
                        }

                        for tc in choice.delta.tool_calls.unwrap_or_default() {
                            let (name, arguments) = match tc.function {
                                Some(f) => (f.name, f.arguments),
                                None => (None, None),
                            };
                            yield StreamEvent::ToolCallDelta {
                                index: tc.index,
                                id: tc.id,
                                name,
                                arguments,
                            };
                        }

                        if let Some(reason) = choice.finish_reason.as_deref() {
                            finish_reason = FinishReason::parse(reason);
                        }
                    }

                    if let Some(stream_usage) = chunk.usage {
                        usage = stream_usage.into();
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    event_source.close();
                    yield StreamEvent::Error {
                        message: format!("SSE error: {}", e),
                    };
                    return;
                }
            }
        }

        event_source.close();
        yield StreamEvent::Done { usage, finish_reason };
    }
}

// Request types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAIMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

// Buffered response types

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            input: u.prompt_tokens,
            output: u.completion_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModelSettings, ToolSpec};

    fn sample_request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".into(),
            system_prompt: Some("You are helpful.".into()),
            messages: vec![
                Message::user("weather?"),
                Message::assistant(None, vec![ToolCall::new("c1", "weather", "{\"city\":\"Oslo\"}")]),
                Message::tool_result("c1", "weather", "rain", false),
            ],
            tools: vec![ToolSpec::new(
                "weather",
                "Look up weather",
                serde_json::json!({"type": "object"}),
            )],
            settings: ModelSettings {
                temperature: Some(0.3),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_build_request_maps_roles_and_tools() {
        let body = serde_json::to_value(build_request(&sample_request(), false)).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["name"], "weather");
        assert_eq!(messages[3]["tool_call_id"], "c1");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["stream"], false);
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn test_build_request_stream_asks_for_usage() {
        let body = serde_json::to_value(build_request(&sample_request(), true)).unwrap();
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn test_extra_settings_are_flattened() {
        let mut request = CompletionRequest::new("m");
        request
            .settings
            .extra
            .insert("seed".into(), serde_json::json!(7));
        let body = serde_json::to_value(build_request(&request, false)).unwrap();
        assert_eq!(body["seed"], 7);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let raw = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "transfer_to_research", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        });
        let completion = parse_response(serde_json::from_value(raw).unwrap()).unwrap();
        assert_eq!(completion.tool_calls[0].name, "transfer_to_research");
        assert_eq!(completion.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(completion.usage, Usage { input: 12, output: 3 });
    }

    #[test]
    fn test_parse_response_without_choices_fails() {
        let raw = serde_json::json!({"choices": []});
        assert!(parse_response(serde_json::from_value(raw).unwrap()).is_err());
    }

    #[test]
    fn test_api_error_from_envelope() {
        let e = api_error(
            429,
            r#"{"error": {"message": "slow down", "type": "rate_limit_error"}}"#,
        );
        assert_eq!(e.to_string(), "API error: slow down (type: rate_limit_error)");
        let e = api_error(502, "bad gateway");
        assert!(e.to_string().contains("http_502"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider = OpenAIProvider::new("k").with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.url(), "http://localhost:8080/v1/chat/completions");
    }
}
