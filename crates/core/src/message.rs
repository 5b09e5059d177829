//! Message and Conversation domain types.
//!
//! These are the value objects that flow through the entire system:
//! user sends a message → transcript appends it → orchestrator replays the
//! history to the model → tool responses and the final answer are appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

/// Per-message accounting attached to model turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl MessageMetadata {
    pub fn is_empty(&self) -> bool {
        self.token_usage.is_none() && self.model_id.is_none() && self.latency_ms.is_none()
    }
}

/// A single persisted message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Owning conversation (empty for messages never persisted, e.g. a system prompt)
    #[serde(default)]
    pub conversation_id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Token usage, model and latency for model turns
    #[serde(default, skip_serializing_if = "MessageMetadata::is_empty")]
    pub metadata: MessageMetadata,

    /// Timestamp
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: String::new(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            metadata: MessageMetadata::default(),
            created_at: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// An assistant message carrying at least one tool-call request.
    pub fn requests_tools(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string (exactly as the model produced them)
    pub arguments: String,
}

/// A message about to be appended to a transcript.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub tool_calls: Vec<MessageToolCall>,
    pub tool_call_id: Option<String>,
    pub metadata: MessageMetadata,
}

impl NewMessage {
    fn new(conversation_id: &str, role: Role, content: String) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            metadata: MessageMetadata::default(),
        }
    }

    pub fn user(conversation_id: &str, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::User, content.into())
    }

    pub fn assistant(conversation_id: &str, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::Assistant, content.into())
    }

    pub fn system(conversation_id: &str, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::System, content.into())
    }

    pub fn tool(
        conversation_id: &str,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(conversation_id, Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<MessageToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check the per-role shape rules before the row is written.
    pub fn validate(&self) -> Result<(), StoreError> {
        match self.role {
            Role::Tool => {
                if self.tool_call_id.as_deref().is_none_or(str::is_empty) {
                    return Err(StoreError::InvalidMessage(
                        "tool messages require a non-empty tool_call_id".into(),
                    ));
                }
            }
            _ if self.tool_call_id.is_some() => {
                return Err(StoreError::InvalidMessage(format!(
                    "tool_call_id is only valid on tool messages, got {}",
                    self.role.as_str()
                )));
            }
            _ => {}
        }

        if self.role != Role::Assistant && !self.tool_calls.is_empty() {
            return Err(StoreError::InvalidMessage(format!(
                "tool calls are only valid on assistant messages, got {}",
                self.role.as_str()
            )));
        }

        Ok(())
    }

    /// Materialize into a stored message with a fresh id and timestamp.
    pub fn into_message(self, created_at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: self.conversation_id,
            role: self.role,
            content: self.content,
            tool_calls: self.tool_calls,
            tool_call_id: self.tool_call_id,
            metadata: self.metadata,
            created_at,
        }
    }
}

/// Lifecycle of a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Archived,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ConversationStatus::Active),
            "archived" => Some(ConversationStatus::Archived),
            _ => None,
        }
    }
}

/// A conversation owned by a user, optionally scoped to a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Owning user
    pub user_id: String,

    /// Project whose data the tools operate on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Free-form page/workflow hints supplied by the caller
    #[serde(default)]
    pub context: serde_json::Value,

    pub status: ConversationStatus,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new active conversation.
    pub fn new(
        user_id: impl Into<String>,
        project_id: Option<String>,
        context: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            user_id: user_id.into(),
            project_id,
            context,
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.status == ConversationStatus::Archived
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
        assert!(!msg.requests_tools());
    }

    #[test]
    fn tool_message_requires_call_id() {
        let mut msg = NewMessage::tool("conv", "call_1", "{}");
        assert!(msg.validate().is_ok());

        msg.tool_call_id = Some(String::new());
        assert!(matches!(msg.validate(), Err(StoreError::InvalidMessage(_))));

        msg.tool_call_id = None;
        assert!(msg.validate().is_err());
    }

    #[test]
    fn tool_calls_only_on_assistant() {
        let call = MessageToolCall {
            id: "c1".into(),
            name: "lookup".into(),
            arguments: "{}".into(),
        };
        let ok = NewMessage::assistant("conv", "").with_tool_calls(vec![call.clone()]);
        assert!(ok.validate().is_ok());

        let bad = NewMessage::user("conv", "hi").with_tool_calls(vec![call]);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn call_id_only_on_tool_messages() {
        let mut msg = NewMessage::assistant("conv", "text");
        msg.tool_call_id = Some("c1".into());
        assert!(msg.validate().is_err());
    }

    #[test]
    fn metadata_skipped_when_empty() {
        let msg = Message::assistant("done");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("metadata"));

        let mut msg = Message::assistant("done");
        msg.metadata.model_id = Some("gpt-4o".into());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("gpt-4o"));
    }

    #[test]
    fn role_and_status_text_forms() {
        for role in [Role::User, Role::Assistant, Role::System, Role::Tool] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(ConversationStatus::parse("archived"), Some(ConversationStatus::Archived));
        assert_eq!(ConversationStatus::parse("deleted"), None);
    }

    #[test]
    fn new_conversation_is_active() {
        let conv = Conversation::new(
            "user-1",
            Some("proj".into()),
            serde_json::json!({"page": "dashboard"}),
        );
        assert!(!conv.is_archived());
        assert_eq!(conv.created_at, conv.updated_at);
        assert_eq!(conv.context["page"], "dashboard");
    }
}
