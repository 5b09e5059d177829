//! Transcript store trait: durable conversations and their messages.
//!
//! Messages are append-only and ordered by `(created_at, insertion order)`.
//! Reads for the model go through [`TranscriptStore::build_model_history`],
//! which drops incomplete tool-call groups (see [`crate::history`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::history::reconstruct_history;
use crate::message::{Conversation, Message, NewMessage, Role};

/// Aggregates over one conversation's transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationStats {
    pub message_count: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub tool_messages: usize,
    pub system_messages: usize,
    /// Tool-call requests issued by assistant turns
    pub tool_calls: usize,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_latency_ms: Option<f64>,
}

impl ConversationStats {
    pub fn from_messages(messages: &[Message]) -> Self {
        let mut stats = Self {
            message_count: messages.len(),
            ..Self::default()
        };
        let mut latency_sum = 0u64;
        let mut latency_samples = 0u64;

        for msg in messages {
            match msg.role {
                Role::User => stats.user_messages += 1,
                Role::Assistant => stats.assistant_messages += 1,
                Role::Tool => stats.tool_messages += 1,
                Role::System => stats.system_messages += 1,
            }
            stats.tool_calls += msg.tool_calls.len();
            if let Some(tokens) = msg.metadata.token_usage {
                stats.total_tokens += u64::from(tokens);
            }
            if let Some(latency) = msg.metadata.latency_ms {
                latency_sum += latency;
                latency_samples += 1;
            }
        }

        if latency_samples > 0 {
            stats.average_latency_ms = Some(latency_sum as f64 / latency_samples as f64);
        }
        stats
    }
}

/// The core TranscriptStore trait.
///
/// Implementations: SQLite, in-memory (for testing).
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    async fn create_conversation(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        context: serde_json::Value,
    ) -> Result<Conversation, StoreError>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError>;

    /// Conversations of a user, most recently updated first.
    async fn list_conversations(
        &self,
        user_id: &str,
        include_archived: bool,
    ) -> Result<Vec<Conversation>, StoreError>;

    /// Insert a message, then bump the owning conversation's `updated_at`.
    async fn append_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// All messages of a conversation in chronological order.
    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError>;

    /// The newest `limit` messages, returned in chronological order.
    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;

    /// Returns `false` if the conversation does not exist.
    async fn archive_conversation(&self, id: &str) -> Result<bool, StoreError>;

    /// Delete a conversation and all its messages.
    async fn delete_conversation(&self, id: &str) -> Result<bool, StoreError>;

    /// A protocol-valid history for the model: the newest `max_messages` rows
    /// with every incomplete tool-call group removed.
    async fn build_model_history(
        &self,
        conversation_id: &str,
        max_messages: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let recent = self.recent_messages(conversation_id, max_messages).await?;
        Ok(reconstruct_history(&recent))
    }

    async fn compute_stats(&self, conversation_id: &str) -> Result<ConversationStats, StoreError> {
        let messages = self.get_messages(conversation_id).await?;
        Ok(ConversationStats::from_messages(&messages))
    }
}
