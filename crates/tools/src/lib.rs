//! Tool execution for Helmsman.
//!
//! The [`ToolExecutor`] turns a tool name plus arguments into an
//! [`ExecutionResult`](helmsman_core::tool::ExecutionResult): it enforces the
//! required-parameter gate, isolates handler failures, and writes one audit
//! record per attempt. The built-in tools work on the project-scoped store
//! and the transcript handed over in the execution context.

pub mod audit;
pub mod builtin;
pub mod executor;
pub mod validation;

use helmsman_core::tool::ToolRegistry;

pub use audit::{InMemoryAuditLog, TracingAuditLog};
pub use builtin::{
    AnalyzeConversationTool, GetSchemaTool, QueryRecordsTool, UpdateRecordsTool, register_builtins,
};
pub use executor::ToolExecutor;
pub use validation::{ValidationReport, validate_arguments};

/// Create a registry holding every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_builtin_tools() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            vec!["analyze_conversation", "get_schema", "query_records", "update_records"]
        );
    }

    #[test]
    fn builtin_definitions_declare_required_sql() {
        let registry = default_registry();
        let defs = registry.list();
        let query = defs.iter().find(|d| d.name == "query_records").unwrap();
        assert_eq!(query.parameters["required"], serde_json::json!(["sql"]));
        let schema = defs.iter().find(|d| d.name == "get_schema").unwrap();
        assert_eq!(schema.parameters["required"], serde_json::json!([]));
    }
}
