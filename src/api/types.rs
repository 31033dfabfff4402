//! API request and response types

use crate::message::{ConversationMessage, Role};
use crate::store::{Chat, StoredMessage};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/chat/stream`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamRequest {
    /// Prior turns of the conversation
    pub messages: Vec<HistoryMessage>,
    pub new_message: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl ChatStreamRequest {
    /// The run's starting history: prior user and assistant turns, then the
    /// new message. Client-supplied system and tool messages are dropped.
    pub fn history(&self) -> Vec<ConversationMessage> {
        self.messages
            .iter()
            .filter_map(|m| match m.role {
                Role::User => Some(ConversationMessage::user(m.content.as_str())),
                Role::Assistant => Some(ConversationMessage::assistant(m.content.as_str())),
                Role::System | Role::Tool => None,
            })
            .chain(std::iter::once(ConversationMessage::user(
                self.new_message.trim(),
            )))
            .collect()
    }
}

/// Request to create a chat
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateChatRequest {
    pub title: String,
}

/// Request to store a message in a chat
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreMessageRequest {
    pub content: String,
    #[serde(default = "default_store_role")]
    pub role: Role,
}

fn default_store_role() -> Role {
    Role::Assistant
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub chat: Chat,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatListResponse {
    pub chats: Vec<Chat>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: StoredMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub messages: Vec<StoredMessage>,
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
