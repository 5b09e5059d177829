//! `update_records`: data writes against the project store.

use async_trait::async_trait;
use helmsman_core::error::ToolError;
use helmsman_core::tool::{
    Arguments, ExecutionContext, ParameterSchema, ParameterSpec, ToolDescriptor, ToolHandler,
};
use serde_json::json;
use tracing::info;

use super::{params_arg, sql, store_failure, string_arg};

pub struct UpdateRecordsTool;

impl UpdateRecordsTool {
    pub const NAME: &'static str = "update_records";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            "Insert, update or delete rows in the project database with a single \
             INSERT, UPDATE or DELETE statement. Schema changes are not allowed.",
            ParameterSchema::new()
                .required_param(
                    "sql",
                    ParameterSpec::string("A single INSERT, UPDATE or DELETE statement"),
                )
                .optional_param("params", ParameterSpec::array("Positional parameter values")),
            Self,
        )
    }
}

#[async_trait]
impl ToolHandler for UpdateRecordsTool {
    async fn call(
        &self,
        arguments: Arguments,
        context: ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let statement = string_arg(&arguments, "sql")?;
        sql::ensure_data_write(Self::NAME, statement)?;
        let params = params_arg(&arguments)?;

        let store = context.project_store().await?;
        let affected = store
            .execute(statement, &params)
            .await
            .map_err(|e| store_failure(Self::NAME, e))?;

        info!(
            project_id = store.project_id(),
            user_id = %context.user_id,
            affected,
            "Project records modified"
        );
        Ok(json!({ "affected_rows": affected }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::test_support::{args, seeded_context};

    #[tokio::test]
    async fn update_reports_affected_rows() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = seeded_context(dir.path()).await;

        let out = UpdateRecordsTool
            .call(
                args(json!({
                    "sql": "UPDATE orders SET total = 0 WHERE customer = ?1",
                    "params": ["Ada"],
                })),
                ctx.clone(),
            )
            .await
            .unwrap();
        assert_eq!(out, json!({"affected_rows": 2}));

        let rows = ctx
            .project_store()
            .await
            .unwrap()
            .query("SELECT SUM(total) AS total FROM orders", &[])
            .await
            .unwrap();
        assert_eq!(rows[0]["total"], json!(42.0));
    }

    #[tokio::test]
    async fn schema_changes_are_denied() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = seeded_context(dir.path()).await;

        let err = UpdateRecordsTool
            .call(args(json!({"sql": "DROP TABLE orders"})), ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn constraint_violation_is_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = seeded_context(dir.path()).await;

        let err = UpdateRecordsTool
            .call(
                args(json!({
                    "sql": "INSERT INTO orders (id, customer) VALUES (?1, ?2)",
                    "params": [1, "Dup"],
                })),
                ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
