//! Chat and message persistence
//!
//! Two collaborators: `MessageStore` for the conversation log of a chat and
//! `ChatStore` for the chats a user owns. Both are implemented by the SQLite
//! store and the in-memory store.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::message::Role;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Chat not found: {0}")]
    ChatNotFound(String),
    #[error("Chat {0} belongs to another user")]
    Forbidden(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A persisted message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Conversation log of a chat
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message; fails if the chat does not exist
    async fn append_message(
        &self,
        chat_id: &str,
        content: &str,
        role: Role,
    ) -> StoreResult<StoredMessage>;

    /// All messages of a chat, oldest first
    async fn list_messages(&self, chat_id: &str) -> StoreResult<Vec<StoredMessage>>;
}

/// Chats owned by users
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_chat(&self, user_id: &str, title: &str) -> StoreResult<Chat>;

    async fn get_chat(&self, chat_id: &str) -> StoreResult<Chat>;

    /// Chats of one user, newest first
    async fn list_chats(&self, user_id: &str) -> StoreResult<Vec<Chat>>;

    /// Delete a chat and its messages. Only the owner may delete.
    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> StoreResult<()>;
}

/// Combined storage trait for convenience
pub trait Storage: MessageStore + ChatStore {}
impl<T: MessageStore + ChatStore> Storage for T {}

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn append_message(
        &self,
        chat_id: &str,
        content: &str,
        role: Role,
    ) -> StoreResult<StoredMessage> {
        (**self).append_message(chat_id, content, role).await
    }

    async fn list_messages(&self, chat_id: &str) -> StoreResult<Vec<StoredMessage>> {
        (**self).list_messages(chat_id).await
    }
}

/// Look up a chat and check that `user_id` owns it
pub async fn owned_chat<S: ChatStore + ?Sized>(
    store: &S,
    user_id: &str,
    chat_id: &str,
) -> StoreResult<Chat> {
    let chat = store.get_chat(chat_id).await?;
    if chat.user_id == user_id {
        Ok(chat)
    } else {
        Err(StoreError::Forbidden(chat_id.to_string()))
    }
}
