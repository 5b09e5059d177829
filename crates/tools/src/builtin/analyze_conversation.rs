//! `analyze_conversation`: transcript statistics for the model.

use async_trait::async_trait;
use helmsman_core::error::ToolError;
use helmsman_core::tool::{
    Arguments, ExecutionContext, ParameterSchema, ParameterSpec, ToolDescriptor, ToolHandler,
};
use helmsman_core::transcript::ConversationStats;
use serde_json::json;
use std::collections::BTreeMap;

use super::optional_string_arg;

pub struct AnalyzeConversationTool;

impl AnalyzeConversationTool {
    pub const NAME: &'static str = "analyze_conversation";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            "Summarize a conversation: message counts by role, tool calls per tool, \
             token usage and average latency. Defaults to the current conversation.",
            ParameterSchema::new().optional_param(
                "conversation_id",
                ParameterSpec::string("Conversation to analyze (defaults to the current one)"),
            ),
            Self,
        )
    }
}

#[async_trait]
impl ToolHandler for AnalyzeConversationTool {
    async fn call(
        &self,
        arguments: Arguments,
        context: ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let transcript = context
            .transcript
            .as_ref()
            .ok_or_else(|| ToolError::StoreUnavailable("no transcript store available".into()))?;

        let conversation_id = optional_string_arg(&arguments, "conversation_id")?
            .map(String::from)
            .or_else(|| context.conversation_id.clone())
            .ok_or_else(|| ToolError::InvalidArguments("no conversation selected".into()))?;

        // Other users' conversations are reported as missing
        let not_found = || ToolError::ExecutionFailed {
            tool_name: Self::NAME.into(),
            reason: format!("Conversation not found: {conversation_id}"),
        };
        let conversation = transcript
            .get_conversation(&conversation_id)
            .await?
            .filter(|c| c.user_id == context.user_id)
            .ok_or_else(not_found)?;

        let messages = transcript.get_messages(conversation.id.as_str()).await?;
        let stats = ConversationStats::from_messages(&messages);

        let mut tools: BTreeMap<&str, usize> = BTreeMap::new();
        for call in messages.iter().flat_map(|m| m.tool_calls.iter()) {
            *tools.entry(call.name.as_str()).or_default() += 1;
        }

        Ok(json!({
            "conversation_id": conversation.id.as_str(),
            "status": conversation.status.as_str(),
            "stats": stats,
            "tools": tools,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::test_support::args;
    use helmsman_core::message::{MessageMetadata, MessageToolCall, NewMessage};
    use helmsman_core::transcript::TranscriptStore;
    use helmsman_store::InMemoryTranscriptStore;
    use std::sync::Arc;

    async fn transcript_with_history() -> (Arc<InMemoryTranscriptStore>, String) {
        let store = Arc::new(InMemoryTranscriptStore::new());
        let conv = store.create_conversation("user-1", None, json!(null)).await.unwrap();
        let id = conv.id.as_str().to_string();

        store.append_message(NewMessage::user(&id, "how many orders?")).await.unwrap();
        let calls = vec![
            MessageToolCall {
                id: "c1".into(),
                name: "query_records".into(),
                arguments: "{}".into(),
            },
            MessageToolCall {
                id: "c2".into(),
                name: "get_schema".into(),
                arguments: "{}".into(),
            },
        ];
        store
            .append_message(NewMessage::assistant(&id, "").with_tool_calls(calls))
            .await
            .unwrap();
        store.append_message(NewMessage::tool(&id, "c1", "{}")).await.unwrap();
        store.append_message(NewMessage::tool(&id, "c2", "{}")).await.unwrap();
        store
            .append_message(NewMessage::assistant(&id, "Three orders.").with_metadata(
                MessageMetadata {
                    token_usage: Some(120),
                    model_id: Some("gpt-4o-mini".into()),
                    latency_ms: Some(300),
                },
            ))
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn summarizes_current_conversation() {
        let (store, id) = transcript_with_history().await;
        let ctx = ExecutionContext::new("user-1")
            .with_conversation(id.clone())
            .with_transcript(store);

        let out = AnalyzeConversationTool.call(Arguments::new(), ctx).await.unwrap();
        assert_eq!(out["conversation_id"], json!(id));
        assert_eq!(out["stats"]["message_count"], 5);
        assert_eq!(out["stats"]["tool_calls"], 2);
        assert_eq!(out["stats"]["total_tokens"], 120);
        assert_eq!(out["tools"], json!({"get_schema": 1, "query_records": 1}));
    }

    #[tokio::test]
    async fn other_users_conversation_is_not_found() {
        let (store, id) = transcript_with_history().await;
        let ctx = ExecutionContext::new("intruder").with_transcript(store);

        let err = AnalyzeConversationTool
            .call(args(json!({"conversation_id": id})), ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Conversation not found"));
    }

    #[tokio::test]
    async fn requires_a_conversation() {
        let store = Arc::new(InMemoryTranscriptStore::new());
        let ctx = ExecutionContext::new("user-1").with_transcript(store);
        let err = AnalyzeConversationTool.call(Arguments::new(), ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
