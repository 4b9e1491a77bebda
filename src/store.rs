//! Conversation persistence boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::Message;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("conversation {0} is not accessible")]
    Forbidden(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A message as persisted, with its position in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: u64,
    pub conversation_id: String,
    pub sequence: usize,
    pub message: Message,
}

/// Append-only message storage.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<StoredMessage, StoreError>;

    /// Messages in the order they were saved; empty for a new conversation.
    async fn load_history(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError>;
}

/// In-process [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<String, Vec<StoredMessage>>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<StoredMessage, StoreError> {
        let mut conversations = self.conversations.write().await;
        let history = conversations.entry(conversation_id.to_string()).or_default();

        let stored = StoredMessage {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            conversation_id: conversation_id.to_string(),
            sequence: history.len(),
            message: message.clone(),
        };
        history.push(stored.clone());
        Ok(stored)
    }

    async fn load_history(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(conversation_id)
            .map(|history| history.iter().map(|s| s.message.clone()).collect())
            .unwrap_or_default())
    }
}
