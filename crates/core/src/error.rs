//! Error types for the Helmsman domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Helmsman operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    /// The response body could not be parsed (non-JSON, HTML error page, truncated).
    #[error("Malformed response body: {0}")]
    MalformedResponse(String),

    /// The body parsed but lacks the required shape (no choices, no message).
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether this failure is worth retrying.
    ///
    /// Transient: malformed or HTML bodies, gateway errors (502/503/504),
    /// timeouts and connection resets. Protocol violations are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::MalformedResponse(_) | ProviderError::Timeout(_) => true,
            ProviderError::ApiError {
                status_code,
                message,
            } => matches!(status_code, 502..=504) || looks_like_html(message),
            ProviderError::Network(message) => {
                let lower = message.to_lowercase();
                [
                    "reset",
                    "timed out",
                    "timeout",
                    "broken pipe",
                    "connection closed",
                    "unexpected eof",
                ]
                .iter()
                .any(|needle| lower.contains(needle))
            }
            ProviderError::InvalidResponse(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::AuthenticationFailed(_)
            | ProviderError::NotConfigured(_) => false,
        }
    }

    /// Whether this is a protocol violation (response shape unusable).
    pub fn is_protocol(&self) -> bool {
        matches!(self, ProviderError::InvalidResponse(_))
    }
}

fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start().to_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Conversation is archived: {0}")]
    ConversationArchived(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid project id: {0}")]
    InvalidProject(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingParameters(Vec<String>),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Project store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for ToolError {
    fn from(err: StoreError) -> Self {
        ToolError::StoreUnavailable(err.to_string())
    }
}
