//! Built-in tools over the project-scoped store and the transcript.
//!
//! Each tool is a unit struct implementing [`ToolHandler`] plus a
//! `descriptor()` constructor carrying its name, description and schema.

pub mod analyze_conversation;
pub mod get_schema;
pub mod query_records;
pub mod sql;
pub mod update_records;

pub use analyze_conversation::AnalyzeConversationTool;
pub use get_schema::GetSchemaTool;
pub use query_records::QueryRecordsTool;
pub use update_records::UpdateRecordsTool;

use helmsman_core::error::{StoreError, ToolError};
use helmsman_core::tool::{Arguments, ToolRegistry};

/// Register every built-in tool.
pub fn register_builtins(registry: &mut ToolRegistry) {
    registry.register(QueryRecordsTool::descriptor());
    registry.register(GetSchemaTool::descriptor());
    registry.register(UpdateRecordsTool::descriptor());
    registry.register(AnalyzeConversationTool::descriptor());
}

fn string_arg<'a>(arguments: &'a Arguments, name: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{name}' must be a string")))
}

fn optional_string_arg<'a>(
    arguments: &'a Arguments,
    name: &str,
) -> Result<Option<&'a str>, ToolError> {
    match arguments.get(name) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ToolError::InvalidArguments(format!("'{name}' must be a string"))),
    }
}

/// Positional `params`, defaulting to none.
fn params_arg(arguments: &Arguments) -> Result<Vec<serde_json::Value>, ToolError> {
    match arguments.get("params") {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(ToolError::InvalidArguments("'params' must be an array".into())),
    }
}

/// A failed statement is the tool's failure; anything else means the store
/// itself is unusable.
fn store_failure(tool_name: &str, err: StoreError) -> ToolError {
    match err {
        StoreError::QueryFailed(reason) => ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason,
        },
        other => other.into(),
    }
}
