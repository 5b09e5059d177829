//! # Helmsman Core
//!
//! Domain types, traits, and error definitions for the Helmsman tool-calling
//! orchestrator. This crate has **zero framework dependencies**: it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping the transcript backend (SQLite, in-memory) via configuration
//! - Easy testing with scripted providers and spy tool handlers
//! - Clean dependency graph (all crates depend inward on core)

pub mod audit;
pub mod error;
pub mod event;
pub mod history;
pub mod message;
pub mod project;
pub mod provider;
pub mod tool;
pub mod transcript;

// Re-export key types at crate root for ergonomics
pub use audit::{ActionKind, AuditFilter, AuditLog, ToolExecutionRecord};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use history::reconstruct_history;
pub use message::{
    Conversation, ConversationId, ConversationStatus, Message, MessageMetadata, MessageToolCall,
    NewMessage, Role,
};
pub use project::{ProjectStore, ProjectStoreResolver, TableSummary};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, ToolDefinition, Usage};
pub use tool::{
    Arguments, ExecutionContext, ExecutionResult, FnHandler, ParamType, ParameterSchema,
    ParameterSpec, ToolDescriptor, ToolHandler, ToolRegistry, handler_fn,
};
pub use transcript::{ConversationStats, TranscriptStore};
