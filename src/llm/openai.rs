//! OpenAI-compatible chat completions provider
//!
//! Speaks the `chat/completions` wire format used by Groq, `OpenAI` and most
//! hosted inference gateways, in both batch and `stream: true` modes.

use super::types::{LlmRequest, LlmResponse, LlmStream, LlmStreamEvent, Usage};
use super::{LlmError, LlmService};
use crate::message::{
    CacheControl, ContentPart, ConversationMessage, MessageContent, Role, ToolCallRequest,
};
use crate::protocol::LineBuffer;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// OpenAI-compatible service implementation
pub struct OpenAiCompatService {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiCompatService {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<&str>,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).to_string(),
        })
    }

    fn translate_request(&self, request: &LlmRequest, stream: bool) -> OpenAiRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if !request.system.is_empty() {
            let parts: Vec<OpenAiContentPart> = request
                .system
                .iter()
                .map(|s| OpenAiContentPart {
                    r#type: "text".to_string(),
                    text: s.text.clone(),
                    cache_control: s.cache.then_some(CacheControl::Ephemeral),
                })
                .collect();
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: Some(OpenAiContent::Parts(parts)),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        messages.extend(request.messages.iter().map(translate_message));

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| OpenAiTool {
                        r#type: "function".to_string(),
                        function: OpenAiFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        OpenAiRequest {
            model: self.model.clone(),
            messages,
            tools,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
        }
    }

    async fn send(&self, body: &OpenAiRequest) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .map(Duration::from_secs_f64);
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        let mut err = match serde_json::from_str::<OpenAiErrorResponse>(&body) {
            Ok(parsed) => LlmError::from_status(
                status.as_u16(),
                parsed.error.code.as_deref(),
                &parsed.error.message,
            ),
            Err(_) => LlmError::from_status(status.as_u16(), None, &body),
        };
        if let Some(delay) = retry_after {
            err = err.with_retry_after(delay);
        }
        Err(err)
    }
}

fn translate_content(content: &MessageContent) -> OpenAiContent {
    match content {
        MessageContent::Text(text) => OpenAiContent::Text(text.clone()),
        MessageContent::Parts(parts) => OpenAiContent::Parts(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text {
                        text,
                        cache_control,
                    } => OpenAiContentPart {
                        r#type: "text".to_string(),
                        text: text.clone(),
                        cache_control: *cache_control,
                    },
                })
                .collect(),
        ),
    }
}

fn translate_message(msg: &ConversationMessage) -> OpenAiMessage {
    let tool_calls = if msg.tool_calls.is_empty() {
        None
    } else {
        Some(
            msg.tool_calls
                .iter()
                .map(|call| OpenAiToolCall {
                    id: call.id.clone(),
                    r#type: "function".to_string(),
                    function: OpenAiFunctionCall {
                        name: call.name.clone(),
                        arguments: match &call.arguments {
                            Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        },
                    },
                })
                .collect(),
        )
    };

    // Assistant turns that only request tools carry no content
    let content = if tool_calls.is_some() && msg.content.is_empty() {
        None
    } else {
        Some(translate_content(&msg.content))
    };

    OpenAiMessage {
        role: msg.role.as_str().to_string(),
        content,
        tool_calls,
        tool_call_id: if msg.role == Role::Tool {
            msg.tool_call_id.clone()
        } else {
            None
        },
    }
}

fn normalize_response(resp: OpenAiResponse) -> Result<LlmResponse, LlmError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::unknown("No choices in response"))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter(|tc| !tc.function.name.is_empty())
        .map(|tc| {
            ToolCallRequest::new(tc.id, tc.function.name, Value::String(tc.function.arguments))
        })
        .collect();

    let usage = resp.usage.map(Usage::from).unwrap_or_default();

    Ok(LlmResponse {
        text: choice.message.content.unwrap_or_default(),
        tool_calls,
        end_turn: choice.finish_reason.as_deref() == Some("stop"),
        usage,
    })
}

#[async_trait]
impl LlmService for OpenAiCompatService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.translate_request(request, false);
        let response = self.send(&body).await?;
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
        let parsed: OpenAiResponse = serde_json::from_str(&text).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {text}"))
        })?;
        normalize_response(parsed)
    }

    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        let body = self.translate_request(request, true);
        let response = self.send(&body).await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(pump_stream(response, tx));
        Ok(ReceiverStream::new(rx).boxed())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Read the `text/event-stream` body and forward assembled events until the
/// body ends, `[DONE]` arrives, or the receiver goes away.
async fn pump_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<LlmStreamEvent, LlmError>>,
) {
    let mut body = response.bytes_stream();
    let mut lines = LineBuffer::default();
    let mut assembler = StreamAssembler::default();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx
                    .send(Err(LlmError::network(format!("Stream read failed: {e}"))))
                    .await;
                return;
            }
        };
        lines.push(&bytes);

        while let Some(line) = lines.next_line() {
            match assembler.accept_line(&line) {
                Ok(events) => {
                    for event in events {
                        if tx.send(Ok(event)).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
            if assembler.is_done() {
                return;
            }
        }
    }

    if let Some(line) = lines.take_remainder() {
        if let Ok(events) = assembler.accept_line(&line) {
            for event in events {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
        }
    }
    for event in assembler.finish() {
        if tx.send(Ok(event)).await.is_err() {
            return;
        }
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds streamed chunks into tokens and whole tool calls.
///
/// Tool-call fragments arrive keyed by index and are only released once the
/// backend finishes the turn.
#[derive(Debug, Default)]
pub(crate) struct StreamAssembler {
    tool_calls: BTreeMap<u32, PartialToolCall>,
    finish_reason: Option<String>,
    usage: Usage,
    done: bool,
}

impl StreamAssembler {
    pub(crate) fn accept_line(&mut self, line: &str) -> Result<Vec<LlmStreamEvent>, LlmError> {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(Vec::new());
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            return Ok(self.finish());
        }

        let chunk: OpenAiStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unparseable stream chunk");
                return Ok(Vec::new());
            }
        };

        if let Some(error) = chunk.error {
            return Err(LlmError::from_status(
                error.status.unwrap_or(500),
                error.code.as_deref(),
                &error.message,
            ));
        }

        if let Some(usage) = chunk
            .usage
            .or_else(|| chunk.x_groq.and_then(|extra| extra.usage))
        {
            self.usage = usage.into();
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    events.push(LlmStreamEvent::Token(text));
                }
            }
            for fragment in choice.delta.tool_calls.unwrap_or_default() {
                let entry = self.tool_calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id {
                    entry.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }
        Ok(events)
    }

    /// Release pending tool calls, plus the end marker if the backend signalled one
    pub(crate) fn finish(&mut self) -> Vec<LlmStreamEvent> {
        if self.done {
            return Vec::new();
        }
        self.done = true;

        let mut events: Vec<LlmStreamEvent> = std::mem::take(&mut self.tool_calls)
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| {
                let id = if call.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    call.id
                };
                LlmStreamEvent::ToolCall(ToolCallRequest::new(
                    id,
                    call.name,
                    Value::String(call.arguments),
                ))
            })
            .collect();

        if let Some(reason) = &self.finish_reason {
            events.push(LlmStreamEvent::End {
                end_turn: reason == "stop",
                usage: self.usage,
            });
        }
        events
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<OpenAiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiContentPart {
    r#type: String,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    status: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    /// Groq reports usage here on the final chunk
    #[serde(default)]
    x_groq: Option<GroqExtra>,
    #[serde(default)]
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct GroqExtra {
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCallFragment>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCallFragment {
    index: u32,
    id: Option<String>,
    function: Option<OpenAiFunctionFragment>,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunctionFragment {
    name: Option<String>,
    arguments: Option<String>,
}
