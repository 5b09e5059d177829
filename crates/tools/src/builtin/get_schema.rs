//! `get_schema`: tables, columns and row counts of the project store.

use async_trait::async_trait;
use helmsman_core::error::ToolError;
use helmsman_core::tool::{
    Arguments, ExecutionContext, ParameterSchema, ParameterSpec, ToolDescriptor, ToolHandler,
};
use serde_json::json;

use super::{optional_string_arg, store_failure};

pub struct GetSchemaTool;

impl GetSchemaTool {
    pub const NAME: &'static str = "get_schema";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            "Describe the project database: table names, their columns and row counts. \
             Pass `table` to describe a single table.",
            ParameterSchema::new()
                .optional_param("table", ParameterSpec::string("Only describe this table")),
            Self,
        )
    }
}

#[async_trait]
impl ToolHandler for GetSchemaTool {
    async fn call(
        &self,
        arguments: Arguments,
        context: ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let table = optional_string_arg(&arguments, "table")?;
        let store = context.project_store().await?;
        let mut tables = store.describe().await.map_err(|e| store_failure(Self::NAME, e))?;

        if let Some(name) = table {
            tables.retain(|t| t.name.eq_ignore_ascii_case(name));
            if tables.is_empty() {
                return Err(ToolError::ExecutionFailed {
                    tool_name: Self::NAME.into(),
                    reason: format!("Unknown table: {name}"),
                });
            }
        }

        Ok(json!({ "tables": tables }))
    }
}
