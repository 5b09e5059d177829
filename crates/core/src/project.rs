//! Project-scoped data stores that tool handlers operate on.
//!
//! The orchestrator never touches project data itself; it only hands a
//! [`ProjectStoreResolver`] to tools through the execution context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::StoreError;

/// One row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Shape of one table in a project store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub columns: Vec<String>,
    pub row_count: u64,
}

/// A data-access handle bound to a single project.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    fn project_id(&self) -> &str;

    /// Run a read statement with positional parameters.
    async fn query(
        &self,
        statement: &str,
        params: &[serde_json::Value],
    ) -> Result<Vec<Row>, StoreError>;

    /// Like [`query`](Self::query), but stops reading after `max_rows` rows.
    async fn query_capped(
        &self,
        statement: &str,
        params: &[serde_json::Value],
        max_rows: usize,
    ) -> Result<Vec<Row>, StoreError>;

    /// Run a write statement, returning the number of affected rows.
    async fn execute(
        &self,
        statement: &str,
        params: &[serde_json::Value],
    ) -> Result<u64, StoreError>;

    /// List tables with their columns and row counts.
    async fn describe(&self) -> Result<Vec<TableSummary>, StoreError>;
}

/// Obtains the store for a project id.
#[async_trait]
pub trait ProjectStoreResolver: Send + Sync {
    async fn resolve(&self, project_id: &str) -> Result<Arc<dyn ProjectStore>, StoreError>;
}
