//! Audit records: one append-only entry per tool execution attempt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Coarse bucket of what a tool does, inferred from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Query,
    Generate,
    Modify,
    Analyze,
    Other,
}

const GENERATE_MARKERS: &[&str] = &["generate", "report", "draft", "compose", "render"];
const MODIFY_MARKERS: &[&str] = &[
    "create", "update", "delete", "insert", "modify", "set", "remove", "write",
];
const ANALYZE_MARKERS: &[&str] = &[
    "analyze", "analyse", "summarize", "compare", "stats", "aggregate",
];
const QUERY_MARKERS: &[&str] = &[
    "query", "get", "list", "search", "find", "lookup", "fetch", "read", "describe",
];

impl ActionKind {
    /// Infer the bucket from `snake_case` name segments, first match wins in
    /// the order generate, modify, analyze, query.
    pub fn from_tool_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        let segments: Vec<&str> = lower
            .split(['_', '-', '.'])
            .filter(|s| !s.is_empty())
            .collect();
        let has = |markers: &[&str]| {
            segments
                .iter()
                .any(|seg| markers.iter().any(|m| seg.starts_with(m)))
        };

        if has(GENERATE_MARKERS) {
            ActionKind::Generate
        } else if has(MODIFY_MARKERS) {
            ActionKind::Modify
        } else if has(ANALYZE_MARKERS) {
            ActionKind::Analyze
        } else if has(QUERY_MARKERS) {
            ActionKind::Query
        } else {
            ActionKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Query => "query",
            ActionKind::Generate => "generate",
            ActionKind::Modify => "modify",
            ActionKind::Analyze => "analyze",
            ActionKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "query" => ActionKind::Query,
            "generate" => ActionKind::Generate,
            "modify" => ActionKind::Modify,
            "analyze" => ActionKind::Analyze,
            _ => ActionKind::Other,
        }
    }
}

/// A single audit log entry. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub action: ActionKind,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Which records to read back.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
    pub tool_name: Option<String>,
    /// Keep only the newest `limit` matches
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, record: &ToolExecutionRecord) -> bool {
        self.conversation_id
            .as_ref()
            .is_none_or(|id| record.conversation_id.as_ref() == Some(id))
            && self.user_id.as_ref().is_none_or(|id| &record.user_id == id)
            && self.tool_name.as_ref().is_none_or(|name| &record.tool_name == name)
    }
}

/// Where execution records are written.
///
/// A failed write is the caller's to swallow; it must never replace the
/// tool's own result.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, record: ToolExecutionRecord) -> Result<(), StoreError>;

    /// Matching records, oldest first.
    async fn records(&self, filter: AuditFilter) -> Result<Vec<ToolExecutionRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_inference() {
        assert_eq!(ActionKind::from_tool_name("query_records"), ActionKind::Query);
        assert_eq!(ActionKind::from_tool_name("get_schema"), ActionKind::Query);
        assert_eq!(ActionKind::from_tool_name("lookup"), ActionKind::Query);
        assert_eq!(ActionKind::from_tool_name("update_records"), ActionKind::Modify);
        assert_eq!(ActionKind::from_tool_name("generate_report"), ActionKind::Generate);
        assert_eq!(ActionKind::from_tool_name("analyze_conversation"), ActionKind::Analyze);
        assert_eq!(ActionKind::from_tool_name("ping"), ActionKind::Other);
    }

    #[test]
    fn generate_wins_over_query() {
        assert_eq!(ActionKind::from_tool_name("get_report"), ActionKind::Generate);
    }

    #[test]
    fn action_kind_text_round_trip() {
        for kind in [
            ActionKind::Query,
            ActionKind::Generate,
            ActionKind::Modify,
            ActionKind::Analyze,
            ActionKind::Other,
        ] {
            assert_eq!(ActionKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn filter_matches_on_all_given_fields() {
        let record = ToolExecutionRecord {
            id: "r1".into(),
            conversation_id: Some("conv".into()),
            user_id: "u1".into(),
            project_id: None,
            action: ActionKind::Query,
            tool_name: "lookup".into(),
            input: serde_json::json!({}),
            output: None,
            success: false,
            error: Some("boom".into()),
            duration_ms: 3,
            timestamp: Utc::now(),
        };
        assert!(AuditFilter::default().matches(&record));
        let filter = AuditFilter {
            conversation_id: Some("conv".into()),
            tool_name: Some("lookup".into()),
            ..AuditFilter::default()
        };
        assert!(filter.matches(&record));
        let filter = AuditFilter {
            user_id: Some("u2".into()),
            ..AuditFilter::default()
        };
        assert!(!filter.matches(&record));
    }
}
