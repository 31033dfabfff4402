//! Working memory of one run

use crate::message::ConversationMessage;
use serde::{Deserialize, Serialize};

/// Ordered, append-only message sequence plus the number of executed nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    messages: Vec<ConversationMessage>,
    steps: u32,
}

impl GraphState {
    pub fn new(messages: Vec<ConversationMessage>) -> Self {
        Self { messages, steps: 0 }
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// The message that decides routing
    pub fn last(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn push(&mut self, message: ConversationMessage) {
        self.messages.push(message);
    }

    pub(crate) fn record_step(&mut self) {
        self.steps = self.steps.saturating_add(1);
    }
}
