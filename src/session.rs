//! In-memory navigation state per conversation
//!
//! Entries are volatile: they live until an order is confirmed, the
//! conversation is closed, or the process exits. There is no eviction.

use crate::state_machine::{ConversationState, SessionUpdate};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct SessionStore {
    states: RwLock<HashMap<String, ConversationState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, conversation_id: &str) -> Option<ConversationState> {
        self.states.read().await.get(conversation_id).cloned()
    }

    pub async fn set(&self, conversation_id: &str, state: ConversationState) {
        self.states
            .write()
            .await
            .insert(conversation_id.to_string(), state);
    }

    pub async fn delete(&self, conversation_id: &str) -> Option<ConversationState> {
        self.states.write().await.remove(conversation_id)
    }

    /// Apply the outcome of a transition to one key
    pub async fn apply(&self, conversation_id: &str, update: SessionUpdate) {
        match update {
            SessionUpdate::Keep => {}
            SessionUpdate::Replace(state) => self.set(conversation_id, state).await,
            SessionUpdate::Delete => {
                self.delete(conversation_id).await;
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::state::Step;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_get_set_delete() {
        let store = SessionStore::new();
        assert!(store.get("a").await.is_none());

        store.set("a", ConversationState::main_menu(vec![])).await;
        assert_eq!(store.get("a").await.unwrap().step, Step::MainMenu);

        assert!(store.delete("a").await.is_some());
        assert!(store.get("a").await.is_none());
        assert!(store.delete("a").await.is_none());
    }

    #[tokio::test]
    async fn test_apply_updates() {
        let store = SessionStore::new();
        store
            .apply("a", SessionUpdate::Replace(ConversationState::main_menu(vec![])))
            .await;
        store.apply("a", SessionUpdate::Keep).await;
        assert_eq!(store.len().await, 1);
        store.apply("a", SessionUpdate::Delete).await;
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_independent_keys_do_not_interfere() {
        let store = Arc::new(SessionStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let key = format!("user-{i}");
                store.set(&key, ConversationState::in_conversation(format!("order-{i}"))).await;
                store.get(&key).await
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let state = handle.await.unwrap().unwrap();
            assert_eq!(state.order_id, Some(format!("order-{i}")));
        }
        assert_eq!(store.len().await, 32);
    }
}
