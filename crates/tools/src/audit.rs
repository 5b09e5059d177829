//! Audit log sinks for tool executions.

use async_trait::async_trait;
use helmsman_core::audit::{AuditFilter, AuditLog, ToolExecutionRecord};
use helmsman_core::error::StoreError;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory audit log that stores records in a vector.
/// Useful for testing and small deployments.
#[derive(Default)]
pub struct InMemoryAuditLog {
    records: RwLock<Vec<ToolExecutionRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, oldest first.
    pub async fn all(&self) -> Vec<ToolExecutionRecord> {
        self.records.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, record: ToolExecutionRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn records(&self, filter: AuditFilter) -> Result<Vec<ToolExecutionRecord>, StoreError> {
        let records = self.records.read().await;
        let matching: Vec<ToolExecutionRecord> = records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        let skip = filter
            .limit
            .map_or(0, |limit| matching.len().saturating_sub(limit));
        Ok(matching.into_iter().skip(skip).collect())
    }
}

/// Emits every record via `tracing::info!` before forwarding it.
pub struct TracingAuditLog {
    inner: Arc<dyn AuditLog>,
}

impl TracingAuditLog {
    pub fn new(inner: Arc<dyn AuditLog>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn record(&self, record: ToolExecutionRecord) -> Result<(), StoreError> {
        tracing::info!(
            tool = %record.tool_name,
            action = record.action.as_str(),
            user_id = %record.user_id,
            conversation_id = ?record.conversation_id,
            success = record.success,
            duration_ms = record.duration_ms,
            error = ?record.error,
            "AUDIT"
        );
        self.inner.record(record).await
    }

    async fn records(&self, filter: AuditFilter) -> Result<Vec<ToolExecutionRecord>, StoreError> {
        self.inner.records(filter).await
    }
}
