//! Scripted model backend for tests

use super::types::{events_to_stream, LlmRequest, LlmResponse, LlmStream, LlmStreamEvent, Usage};
use super::{LlmError, LlmService};
use crate::message::ToolCallRequest;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

type Turn = Result<Vec<Result<LlmStreamEvent, LlmError>>, LlmError>;

/// Mock LLM that replays queued turns in order
///
/// Each queued turn answers one `complete` or `stream` call. An empty queue
/// answers with a network error.
pub struct MockLlm {
    turns: Mutex<VecDeque<Turn>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a raw event sequence
    pub fn queue_events(&self, events: Vec<Result<LlmStreamEvent, LlmError>>) {
        self.turns.lock().unwrap().push_back(Ok(events));
    }

    /// Queue a final answer streamed as the given fragments
    pub fn queue_tokens(&self, fragments: &[&str]) {
        let mut events: Vec<_> = fragments
            .iter()
            .map(|f| Ok(LlmStreamEvent::Token((*f).to_string())))
            .collect();
        events.push(Ok(end(true)));
        self.queue_events(events);
    }

    pub fn queue_text(&self, text: &str) {
        self.queue_tokens(&[text]);
    }

    /// Queue a turn that only requests one tool
    pub fn queue_tool_call(&self, id: &str, name: &str, arguments: Value) {
        self.queue_events(vec![
            Ok(LlmStreamEvent::ToolCall(ToolCallRequest::new(id, name, arguments))),
            Ok(end(false)),
        ]);
    }

    /// Queue a final answer whose backend never signals the end of turn
    pub fn queue_unterminated(&self, text: &str) {
        self.queue_events(vec![Ok(LlmStreamEvent::Token(text.to_string()))]);
    }

    /// Queue a failure to open the request
    pub fn queue_error(&self, error: LlmError) {
        self.turns.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_turn(&self, request: &LlmRequest) -> Turn {
        self.requests.lock().unwrap().push(request.clone());
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }
}

fn end(end_turn: bool) -> LlmStreamEvent {
    LlmStreamEvent::End {
        end_turn,
        usage: Usage::default(),
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut response = LlmResponse::default();
        for event in self.next_turn(request)? {
            match event? {
                LlmStreamEvent::Token(text) => response.text.push_str(&text),
                LlmStreamEvent::ToolCall(call) => response.tool_calls.push(call),
                LlmStreamEvent::End { end_turn, usage } => {
                    response.end_turn = end_turn;
                    response.usage = usage;
                }
            }
        }
        Ok(response)
    }

    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        Ok(events_to_stream(self.next_turn(request)?))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}
