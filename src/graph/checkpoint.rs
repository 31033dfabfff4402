//! Per-run state snapshots, keyed by run identifier (the chat id)
//!
//! A snapshot lives while its run does; the engine removes it once the run
//! has finished.

use super::state::GraphState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, run_id: &str, state: &GraphState);

    async fn load(&self, run_id: &str) -> Option<GraphState>;

    /// Drop the snapshot of a finished run
    async fn remove(&self, run_id: &str);
}

/// In-process checkpoint store
#[derive(Default)]
pub struct MemoryCheckpointStore {
    states: Mutex<HashMap<String, GraphState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, run_id: &str, state: &GraphState) {
        // Poisoning only happens if a previous holder panicked mid-insert;
        // the map is still usable.
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        states.insert(run_id.to_string(), state.clone());
    }

    async fn load(&self, run_id: &str) -> Option<GraphState> {
        let states = self
            .states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        states.get(run_id).cloned()
    }

    async fn remove(&self, run_id: &str) {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        states.remove(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ConversationMessage;

    #[tokio::test]
    async fn test_runs_are_isolated() {
        let store = MemoryCheckpointStore::new();
        store
            .save("chat-a", &GraphState::new(vec![ConversationMessage::user("a")]))
            .await;
        store
            .save("chat-b", &GraphState::new(vec![ConversationMessage::user("b")]))
            .await;

        let a = store.load("chat-a").await.unwrap();
        assert_eq!(a.messages()[0].text(), "a");
        let b = store.load("chat-b").await.unwrap();
        assert_eq!(b.messages()[0].text(), "b");
        assert!(store.load("chat-c").await.is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let store = MemoryCheckpointStore::new();
        let mut state = GraphState::new(vec![ConversationMessage::user("hi")]);
        store.save("chat", &state).await;
        state.push(ConversationMessage::assistant("hello"));
        store.save("chat", &state).await;
        assert_eq!(store.load("chat").await.unwrap().messages().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_only_drops_that_run() {
        let store = MemoryCheckpointStore::new();
        store.save("chat-a", &GraphState::new(Vec::new())).await;
        store.save("chat-b", &GraphState::new(Vec::new())).await;
        store.remove("chat-a").await;
        store.remove("chat-missing").await;
        assert!(store.load("chat-a").await.is_none());
        assert!(store.load("chat-b").await.is_some());
    }
}
