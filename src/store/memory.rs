//! In-memory store, for tests and database-less runs

use super::{Chat, ChatStore, MessageStore, StoreError, StoreResult, StoredMessage};
use crate::message::Role;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Inner {
    chats: HashMap<String, Chat>,
    messages: HashMap<String, Vec<StoredMessage>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append_message(
        &self,
        chat_id: &str,
        content: &str,
        role: Role,
    ) -> StoreResult<StoredMessage> {
        let mut inner = self.lock();
        if !inner.chats.contains_key(chat_id) {
            return Err(StoreError::ChatNotFound(chat_id.to_string()));
        }
        let message = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        inner
            .messages
            .entry(chat_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, chat_id: &str) -> StoreResult<Vec<StoredMessage>> {
        let inner = self.lock();
        if !inner.chats.contains_key(chat_id) {
            return Err(StoreError::ChatNotFound(chat_id.to_string()));
        }
        Ok(inner.messages.get(chat_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_chat(&self, user_id: &str, title: &str) -> StoreResult<Chat> {
        let chat = Chat {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.lock().chats.insert(chat.id.clone(), chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: &str) -> StoreResult<Chat> {
        self.lock()
            .chats
            .get(chat_id)
            .cloned()
            .ok_or_else(|| StoreError::ChatNotFound(chat_id.to_string()))
    }

    async fn list_chats(&self, user_id: &str) -> StoreResult<Vec<Chat>> {
        let mut chats: Vec<Chat> = self
            .lock()
            .chats
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(chats)
    }

    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        match inner.chats.get(chat_id) {
            None => return Err(StoreError::ChatNotFound(chat_id.to_string())),
            Some(chat) if chat.user_id != user_id => {
                return Err(StoreError::Forbidden(chat_id.to_string()));
            }
            Some(_) => {}
        }
        inner.chats.remove(chat_id);
        inner.messages.remove(chat_id);
        Ok(())
    }
}
