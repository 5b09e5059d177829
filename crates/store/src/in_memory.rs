//! In-memory transcript store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use helmsman_core::error::StoreError;
use helmsman_core::message::{Conversation, ConversationStatus, Message, NewMessage};
use helmsman_core::transcript::TranscriptStore;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    conversations: HashMap<String, Conversation>,
    /// Per conversation, in append order
    messages: HashMap<String, Vec<Message>>,
}

/// A transcript store that keeps everything in process memory.
#[derive(Default)]
pub struct InMemoryTranscriptStore {
    state: RwLock<State>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_conversation(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        context: serde_json::Value,
    ) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(user_id, project_id.map(String::from), context);
        self.state
            .write()
            .await
            .conversations
            .insert(conversation.id.0.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.state.read().await.conversations.get(id).cloned())
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        include_archived: bool,
    ) -> Result<Vec<Conversation>, StoreError> {
        let state = self.state.read().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.user_id == user_id && (include_archived || !c.is_archived()))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn append_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        message.validate()?;

        let mut state = self.state.write().await;
        let State {
            conversations,
            messages,
        } = &mut *state;

        let conversation = conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(message.conversation_id.clone()))?;
        if conversation.status == ConversationStatus::Archived {
            return Err(StoreError::ConversationArchived(message.conversation_id));
        }

        let transcript = messages.entry(message.conversation_id.clone()).or_default();
        let mut created_at = Utc::now();
        if let Some(last) = transcript.last() {
            created_at = created_at.max(last.created_at);
        }

        let stored = message.into_message(created_at);
        transcript.push(stored.clone());
        conversation.updated_at = created_at;
        Ok(stored)
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read().await;
        let transcript = state
            .messages
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let start = transcript.len().saturating_sub(limit);
        Ok(transcript[start..].to_vec())
    }

    async fn archive_conversation(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(match state.conversations.get_mut(id) {
            Some(conversation) => {
                conversation.status = ConversationStatus::Archived;
                conversation.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        state.messages.remove(id);
        Ok(state.conversations.remove(id).is_some())
    }
}
