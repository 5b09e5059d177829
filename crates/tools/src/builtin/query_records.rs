//! `query_records`: read-only SQL against the project store.

use async_trait::async_trait;
use helmsman_core::error::ToolError;
use helmsman_core::tool::{
    Arguments, ExecutionContext, ParameterSchema, ParameterSpec, ToolDescriptor, ToolHandler,
};
use serde_json::json;
use tracing::debug;

use super::{params_arg, sql, store_failure, string_arg};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

pub struct QueryRecordsTool;

impl QueryRecordsTool {
    pub const NAME: &'static str = "query_records";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            "Run a read-only SQL query (SELECT or WITH) against the project database. \
             Returns matching rows as objects keyed by column name.",
            ParameterSchema::new()
                .required_param(
                    "sql",
                    ParameterSpec::string("A single SELECT statement; use ?1, ?2 for parameters"),
                )
                .optional_param("params", ParameterSpec::array("Positional parameter values"))
                .optional_param(
                    "limit",
                    ParameterSpec::integer("Maximum rows to return (default 100, max 1000)"),
                ),
            Self,
        )
    }
}

fn row_limit(arguments: &Arguments) -> Result<usize, ToolError> {
    match arguments.get("limit") {
        None | Some(serde_json::Value::Null) => Ok(DEFAULT_LIMIT),
        Some(value) => value
            .as_u64()
            .filter(|n| *n > 0)
            .map(|n| usize::try_from(n).unwrap_or(MAX_LIMIT).min(MAX_LIMIT))
            .ok_or_else(|| {
                ToolError::InvalidArguments("'limit' must be a positive integer".into())
            }),
    }
}

#[async_trait]
impl ToolHandler for QueryRecordsTool {
    async fn call(
        &self,
        arguments: Arguments,
        context: ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let statement = string_arg(&arguments, "sql")?;
        sql::ensure_read_only(Self::NAME, statement)?;
        let params = params_arg(&arguments)?;
        let limit = row_limit(&arguments)?;

        let store = context.project_store().await?;
        // One extra row tells a full page from a truncated one
        let mut rows = store
            .query_capped(statement, &params, limit + 1)
            .await
            .map_err(|e| store_failure(Self::NAME, e))?;

        let truncated = rows.len() > limit;
        rows.truncate(limit);
        debug!(project_id = store.project_id(), rows = rows.len(), truncated, "query_records");

        Ok(json!({
            "rows": rows,
            "row_count": rows.len(),
            "truncated": truncated,
        }))
    }
}
