//! Common types for LLM interactions

use super::LlmError;
use crate::message::{ConversationMessage, ToolCallRequest};
use futures::stream::{self, BoxStream, StreamExt};

/// LLM request
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: Vec<SystemContent>,
    pub messages: Vec<ConversationMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// System prompt content
#[derive(Debug, Clone)]
pub struct SystemContent {
    pub text: String,
    pub cache: bool,
}

impl SystemContent {
    pub fn cached(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache: true,
        }
    }
}

/// Tool definition
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// LLM response (batch mode)
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub end_turn: bool,
    pub usage: Usage,
}

impl LlmResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end_turn: true,
            ..Self::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Replay a batch response as a stream: one token, each tool call, then the end marker
    pub fn into_events(self) -> Vec<LlmStreamEvent> {
        let mut events = Vec::with_capacity(self.tool_calls.len() + 2);
        if !self.text.is_empty() {
            events.push(LlmStreamEvent::Token(self.text));
        }
        events.extend(self.tool_calls.into_iter().map(LlmStreamEvent::ToolCall));
        events.push(LlmStreamEvent::End {
            end_turn: self.end_turn,
            usage: self.usage,
        });
        events
    }
}

/// Event emitted by a model backend in stream mode
#[derive(Debug, Clone, PartialEq)]
pub enum LlmStreamEvent {
    /// Incremental text fragment
    Token(String),
    /// A fully assembled tool call request
    ToolCall(ToolCallRequest),
    /// The backend signalled the end of this turn. Not every backend sends it.
    End { end_turn: bool, usage: Usage },
}

pub type LlmStream = BoxStream<'static, Result<LlmStreamEvent, LlmError>>;

pub fn events_to_stream(events: Vec<Result<LlmStreamEvent, LlmError>>) -> LlmStream {
    stream::iter(events).boxed()
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
