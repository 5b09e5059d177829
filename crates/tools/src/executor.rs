//! Tool executor: runs one tool call behind the parameter gate and audits it.
//!
//! Every failure (unknown tool, missing parameters, handler error or panic)
//! comes back as an unsuccessful [`ExecutionResult`]; nothing propagates to
//! the caller. Each attempt writes exactly one audit record, and a failing
//! audit write is logged and dropped.

use chrono::Utc;
use helmsman_core::audit::{ActionKind, AuditLog, ToolExecutionRecord};
use helmsman_core::error::ToolError;
use helmsman_core::provider::ToolDefinition;
use helmsman_core::tool::{Arguments, ExecutionContext, ExecutionResult, ToolRegistry};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::validation::{ValidationReport, validate_arguments};

/// Runs tools from an immutable registry and audits every attempt.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    audit: Arc<dyn AuditLog>,
}

fn panic_reason(err: tokio::task::JoinError) -> String {
    if err.is_cancelled() {
        return "handler was cancelled".into();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("handler panicked: {msg}")
    } else {
        "handler panicked".into()
    }
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, audit: Arc<dyn AuditLog>) -> Self {
        Self { registry, audit }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Definitions of every registered tool, for the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.list()
    }

    /// Non-executing check of `arguments` against the tool's schema.
    pub fn validate(&self, name: &str, arguments: &Arguments) -> ValidationReport {
        match self.registry.get(name) {
            Some(descriptor) => validate_arguments(&descriptor.parameters, arguments),
            None => {
                ValidationReport::from_errors(vec![ToolError::NotFound(name.into()).to_string()])
            }
        }
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        arguments: Arguments,
        context: &ExecutionContext,
    ) -> ExecutionResult {
        let started = Instant::now();
        let input = serde_json::Value::Object(arguments.clone());

        let outcome = self.dispatch(name, arguments, context.clone()).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(value) => ExecutionResult::ok(value, duration_ms),
            Err(e) => ExecutionResult::failure(e.to_string(), duration_ms),
        };

        debug!(
            tool = name,
            success = result.success,
            duration_ms,
            "Tool executed"
        );

        self.write_audit(name, input, &result, context).await;
        result
    }

    async fn dispatch(
        &self,
        name: &str,
        arguments: Arguments,
        context: ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let missing = descriptor.parameters.missing_required(&arguments);
        if !missing.is_empty() {
            return Err(ToolError::MissingParameters(missing));
        }

        // A panicking handler surfaces as a JoinError instead of unwinding here
        let handler = descriptor.handler.clone();
        let task = tokio::spawn(async move { handler.call(arguments, context).await });
        match task.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: panic_reason(join_err),
            }),
        }
    }

    async fn write_audit(
        &self,
        name: &str,
        input: serde_json::Value,
        result: &ExecutionResult,
        context: &ExecutionContext,
    ) {
        let record = ToolExecutionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: context.conversation_id.clone(),
            user_id: context.user_id.clone(),
            project_id: context.project_id.clone(),
            action: ActionKind::from_tool_name(name),
            tool_name: name.to_string(),
            input,
            output: if result.success { result.result.clone() } else { None },
            success: result.success,
            error: result.error.clone(),
            duration_ms: result.duration_ms,
            timestamp: Utc::now(),
        };

        if let Err(e) = self.audit.record(record).await {
            warn!(tool = name, error = %e, "Failed to write audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditLog;
    use async_trait::async_trait;
    use helmsman_core::audit::AuditFilter;
    use helmsman_core::error::StoreError;
    use helmsman_core::tool::{
        ParameterSchema, ParameterSpec, ToolDescriptor, ToolHandler, handler_fn,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts invocations and returns `{"value": 7}`.
    struct SpyHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolHandler for SpyHandler {
        async fn call(
            &self,
            _arguments: Arguments,
            _context: ExecutionContext,
        ) -> Result<serde_json::Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"value": 7}))
        }
    }

    struct FailingAuditLog;

    #[async_trait]
    impl AuditLog for FailingAuditLog {
        async fn record(&self, _record: ToolExecutionRecord) -> Result<(), StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }

        async fn records(
            &self,
            _filter: AuditFilter,
        ) -> Result<Vec<ToolExecutionRecord>, StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }
    }

    fn lookup_schema() -> ParameterSchema {
        ParameterSchema::new().required_param("id", ParameterSpec::string("Record id"))
    }

    fn setup() -> (ToolExecutor, Arc<InMemoryAuditLog>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor::new(
            "lookup",
            "Look a record up",
            lookup_schema(),
            SpyHandler { calls: calls.clone() },
        ));
        registry.register(ToolDescriptor::new(
            "explode",
            "Always fails",
            ParameterSchema::new(),
            handler_fn(|_args, _ctx| async move {
                Err::<serde_json::Value, _>(ToolError::ExecutionFailed {
                    tool_name: "explode".into(),
                    reason: "boom".into(),
                })
            }),
        ));
        registry.register(ToolDescriptor::new(
            "panics",
            "Panics inside the handler",
            ParameterSchema::new(),
            handler_fn(|_args, _ctx| async move {
                if true {
                    panic!("kaboom");
                }
                Ok::<_, ToolError>(json!(null))
            }),
        ));

        let audit = Arc::new(InMemoryAuditLog::new());
        let executor = ToolExecutor::new(Arc::new(registry), audit.clone());
        (executor, audit, calls)
    }

    fn args(value: serde_json::Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("user-1").with_conversation("conv-1")
    }

    #[tokio::test]
    async fn missing_required_parameter_reports_names() {
        let (executor, _, calls) = setup();
        let result = executor.execute("lookup", Arguments::new(), &ctx()).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Missing required parameters: id"));
        assert!(result.result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn validation_gate_blocks_handler() {
        let (executor, audit, calls) = setup();
        for bad in [json!({}), json!({"id": null}), json!({"other": "x"})] {
            let result = executor.execute("lookup", args(bad), &ctx()).await;
            assert!(!result.success);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(audit.count().await, 3);
    }

    #[tokio::test]
    async fn successful_call_is_audited() {
        let (executor, audit, calls) = setup();
        let result = executor.execute("lookup", args(json!({"id": "42"})), &ctx()).await;
        assert!(result.success);
        assert_eq!(result.result, Some(json!({"value": 7})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let records = audit.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tool_name, "lookup");
        assert_eq!(records[0].action, ActionKind::Query);
        assert_eq!(records[0].conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(records[0].input, json!({"id": "42"}));
        assert_eq!(records[0].output, Some(json!({"value": 7})));
        assert!(records[0].success);
    }

    #[tokio::test]
    async fn handler_error_is_isolated_with_one_audit_record() {
        let (executor, audit, _) = setup();
        let result = executor.execute("explode", Arguments::new(), &ctx()).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("boom"));

        let records = audit.all().await;
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert!(records[0].output.is_none());
        assert!(records[0].error.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn handler_panic_is_contained() {
        let (executor, audit, _) = setup();
        let result = executor.execute("panics", Arguments::new(), &ctx()).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("kaboom"));
        assert_eq!(audit.count().await, 1);
    }

    #[tokio::test]
    async fn unknown_tool_fails_and_is_audited() {
        let (executor, audit, _) = setup();
        let result = executor.execute("nope", Arguments::new(), &ctx()).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Tool not found: nope"));

        let records = audit.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error.as_deref(), Some("Tool not found: nope"));
    }

    #[tokio::test]
    async fn audit_failure_does_not_mask_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor::new(
            "lookup",
            "Look a record up",
            lookup_schema(),
            SpyHandler { calls: calls.clone() },
        ));
        let executor = ToolExecutor::new(Arc::new(registry), Arc::new(FailingAuditLog));

        let result = executor.execute("lookup", args(json!({"id": "42"})), &ctx()).await;
        assert!(result.success);
        assert_eq!(result.result, Some(json!({"value": 7})));
    }

    #[tokio::test]
    async fn repeated_calls_have_identical_shape() {
        let (executor, _, _) = setup();
        let first = executor.execute("lookup", args(json!({"id": "42"})), &ctx()).await;
        let second = executor.execute("lookup", args(json!({"id": "42"})), &ctx()).await;
        assert_eq!(first.result, second.result);
        assert_eq!(first.success, second.success);
        // duration_ms is unsigned; measured, never negative
        assert!(first.duration_ms < 60_000 && second.duration_ms < 60_000);
    }

    #[test]
    fn validate_reports_without_running() {
        let (executor, _, calls) = setup();
        let report = executor.validate("lookup", &args(json!({"id": 42})));
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Parameter 'id' expected string, got integer"]);

        let report = executor.validate("nope", &Arguments::new());
        assert_eq!(report.errors, vec!["Tool not found: nope"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn definitions_expose_schema() {
        let (executor, _, _) = setup();
        let defs = executor.definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["explode", "lookup", "panics"]);
        assert_eq!(defs[1].parameters["required"], json!(["id"]));
    }
}
