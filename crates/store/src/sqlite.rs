//! SQLite transcript store and audit log.
//!
//! One database file with three tables:
//! - `conversations`: one row per conversation
//! - `messages`: append-only transcript rows, cascading on conversation delete
//! - `tool_executions`: the audit log, independent of the transcript
//!
//! Message order is `(created_at, seq)`; `seq` is an autoincrement column, so
//! rows appended within the same microsecond keep their insertion order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use helmsman_core::audit::{ActionKind, AuditFilter, AuditLog, ToolExecutionRecord};
use helmsman_core::error::StoreError;
use helmsman_core::message::{
    Conversation, ConversationId, ConversationStatus, Message, MessageMetadata, MessageToolCall,
    NewMessage, Role,
};
use helmsman_core::transcript::TranscriptStore;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Transcript and audit storage backed by one SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("{column} column: {e}")))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .pragma("foreign_keys", "ON");

        // Each connection to :memory: is a separate database
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite transcript store initialized at {url}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                project_id  TEXT,
                context     TEXT NOT NULL DEFAULT 'null',
                status      TEXT NOT NULL DEFAULT 'active',
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT UNIQUE NOT NULL,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                tool_calls      TEXT NOT NULL DEFAULT '[]',
                tool_call_id    TEXT,
                token_usage     INTEGER,
                model_id        TEXT,
                latency_ms      INTEGER,
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tool_executions (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT UNIQUE NOT NULL,
                conversation_id TEXT,
                user_id         TEXT NOT NULL,
                project_id      TEXT,
                action          TEXT NOT NULL,
                tool_name       TEXT NOT NULL,
                input           TEXT NOT NULL,
                output          TEXT,
                success         INTEGER NOT NULL,
                error           TEXT,
                duration_ms     INTEGER NOT NULL,
                timestamp       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("tool_executions table: {e}")))?;

        for (name, ddl) in [
            (
                "messages order index",
                "CREATE INDEX IF NOT EXISTS idx_messages_conversation \
                 ON messages(conversation_id, created_at, seq)",
            ),
            (
                "conversations user index",
                "CREATE INDEX IF NOT EXISTS idx_conversations_user \
                 ON conversations(user_id, updated_at DESC)",
            ),
            (
                "tool_executions conversation index",
                "CREATE INDEX IF NOT EXISTS idx_tool_executions_conversation \
                 ON tool_executions(conversation_id, seq)",
            ),
        ] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{name}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_conversation(row: &SqliteRow) -> Result<Conversation, StoreError> {
        let id: String = column(row, "id")?;
        let context_json: String = column(row, "context")?;
        let status: String = column(row, "status")?;
        let created_at: String = column(row, "created_at")?;
        let updated_at: String = column(row, "updated_at")?;

        Ok(Conversation {
            id: ConversationId(id),
            user_id: column(row, "user_id")?,
            project_id: column(row, "project_id")?,
            context: serde_json::from_str(&context_json).unwrap_or(serde_json::Value::Null),
            status: ConversationStatus::parse(&status).unwrap_or_default(),
            created_at: parse_ts(&created_at, "created_at")?,
            updated_at: parse_ts(&updated_at, "updated_at")?,
        })
    }

    fn row_to_message(row: &SqliteRow) -> Result<Message, StoreError> {
        let role: String = column(row, "role")?;
        let tool_calls_json: String = column(row, "tool_calls")?;
        let token_usage: Option<i64> = column(row, "token_usage")?;
        let latency_ms: Option<i64> = column(row, "latency_ms")?;
        let created_at: String = column(row, "created_at")?;

        let role = Role::parse(&role)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown role '{role}'")))?;
        let tool_calls: Vec<MessageToolCall> = serde_json::from_str(&tool_calls_json)
            .map_err(|e| StoreError::QueryFailed(format!("tool_calls column: {e}")))?;

        Ok(Message {
            id: column(row, "id")?,
            conversation_id: column(row, "conversation_id")?,
            role,
            content: column(row, "content")?,
            tool_calls,
            tool_call_id: column(row, "tool_call_id")?,
            metadata: MessageMetadata {
                token_usage: token_usage.and_then(|t| u32::try_from(t).ok()),
                model_id: column(row, "model_id")?,
                latency_ms: latency_ms.and_then(|l| u64::try_from(l).ok()),
            },
            created_at: parse_ts(&created_at, "created_at")?,
        })
    }

    fn row_to_record(row: &SqliteRow) -> Result<ToolExecutionRecord, StoreError> {
        let action: String = column(row, "action")?;
        let input: String = column(row, "input")?;
        let output: Option<String> = column(row, "output")?;
        let success: i64 = column(row, "success")?;
        let duration_ms: i64 = column(row, "duration_ms")?;
        let timestamp: String = column(row, "timestamp")?;

        Ok(ToolExecutionRecord {
            id: column(row, "id")?,
            conversation_id: column(row, "conversation_id")?,
            user_id: column(row, "user_id")?,
            project_id: column(row, "project_id")?,
            action: ActionKind::parse(&action),
            tool_name: column(row, "tool_name")?,
            input: serde_json::from_str(&input).unwrap_or(serde_json::Value::Null),
            output: output.and_then(|o| serde_json::from_str(&o).ok()),
            success: success != 0,
            error: column(row, "error")?,
            duration_ms: u64::try_from(duration_ms).unwrap_or(0),
            timestamp: parse_ts(&timestamp, "timestamp")?,
        })
    }
}

#[async_trait]
impl TranscriptStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_conversation(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        context: serde_json::Value,
    ) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(user_id, project_id.map(String::from), context);

        sqlx::query(
            r#"
            INSERT INTO conversations
                (id, user_id, project_id, context, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(conversation.id.as_str())
        .bind(&conversation.user_id)
        .bind(&conversation.project_id)
        .bind(conversation.context.to_string())
        .bind(conversation.status.as_str())
        .bind(format_ts(&conversation.created_at))
        .bind(format_ts(&conversation.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT conversation failed: {e}")))?;

        debug!(conversation_id = %conversation.id, user_id, "Created conversation");
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get conversation: {e}")))?;

        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        include_archived: bool,
    ) -> Result<Vec<Conversation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM conversations
            WHERE user_id = ?1 AND (?2 OR status = 'active')
            ORDER BY updated_at DESC, created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list conversations: {e}")))?;

        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn append_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        message.validate()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        // Take the write lock up front so concurrent appends wait on busy_timeout
        let locked = sqlx::query("UPDATE conversations SET updated_at = updated_at WHERE id = ?1")
            .bind(&message.conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("conversation lock failed: {e}")))?;
        if locked.rows_affected() == 0 {
            return Err(StoreError::ConversationNotFound(message.conversation_id));
        }

        let status: String =
            sqlx::query_scalar("SELECT status FROM conversations WHERE id = ?1")
                .bind(&message.conversation_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("conversation lookup: {e}")))?;
        if ConversationStatus::parse(&status) == Some(ConversationStatus::Archived) {
            return Err(StoreError::ConversationArchived(message.conversation_id));
        }

        // Never order a new row before the conversation's latest one
        let latest: Option<String> = sqlx::query_scalar(
            r#"
            SELECT created_at FROM messages
            WHERE conversation_id = ?1
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#,
        )
        .bind(&message.conversation_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("latest message lookup: {e}")))?;

        let mut created_at = Utc::now();
        if let Some(latest) = latest {
            created_at = created_at.max(parse_ts(&latest, "created_at")?);
        }

        let stored = message.into_message(created_at);
        let tool_calls_json = serde_json::to_string(&stored.tool_calls)
            .map_err(|e| StoreError::Storage(format!("tool_calls serialization: {e}")))?;
        let created_at_str = format_ts(&stored.created_at);

        sqlx::query(
            r#"
            INSERT INTO messages
                (id, conversation_id, role, content, tool_calls, tool_call_id,
                 token_usage, model_id, latency_ms, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.conversation_id)
        .bind(stored.role.as_str())
        .bind(&stored.content)
        .bind(&tool_calls_json)
        .bind(&stored.tool_call_id)
        .bind(stored.metadata.token_usage.map(i64::from))
        .bind(&stored.metadata.model_id)
        .bind(stored.metadata.latency_ms.and_then(|l| i64::try_from(l).ok()))
        .bind(&created_at_str)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT message failed: {e}")))?;

        sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(&created_at_str)
            .bind(&stored.conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE updated_at failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(
            conversation_id = %stored.conversation_id,
            role = stored.role.as_str(),
            tool_calls = stored.tool_calls.len(),
            "Appended message"
        );
        Ok(stored)
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, seq ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("get messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT * FROM messages
                WHERE conversation_id = ?1
                ORDER BY created_at DESC, seq DESC
                LIMIT ?2
            )
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(conversation_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("recent messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn archive_conversation(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE conversations SET status = 'archived', updated_at = ?1 WHERE id = ?2",
        )
        .bind(format_ts(&Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("archive failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditLog for SqliteStore {
    async fn record(&self, record: ToolExecutionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tool_executions
                (id, conversation_id, user_id, project_id, action, tool_name,
                 input, output, success, error, duration_ms, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&record.id)
        .bind(&record.conversation_id)
        .bind(&record.user_id)
        .bind(&record.project_id)
        .bind(record.action.as_str())
        .bind(&record.tool_name)
        .bind(record.input.to_string())
        .bind(record.output.as_ref().map(|o| o.to_string()))
        .bind(record.success)
        .bind(&record.error)
        .bind(i64::try_from(record.duration_ms).unwrap_or(i64::MAX))
        .bind(format_ts(&record.timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT tool execution failed: {e}")))?;

        Ok(())
    }

    async fn records(&self, filter: AuditFilter) -> Result<Vec<ToolExecutionRecord>, StoreError> {
        // A negative LIMIT means no limit in SQLite
        let limit = filter
            .limit
            .and_then(|l| i64::try_from(l).ok())
            .unwrap_or(-1);

        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT * FROM tool_executions
                WHERE (?1 IS NULL OR conversation_id = ?1)
                  AND (?2 IS NULL OR user_id = ?2)
                  AND (?3 IS NULL OR tool_name = ?3)
                ORDER BY seq DESC
                LIMIT ?4
            )
            ORDER BY seq ASC
            "#,
        )
        .bind(&filter.conversation_id)
        .bind(&filter.user_id)
        .bind(&filter.tool_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("audit records: {e}")))?;

        rows.iter().map(Self::row_to_record).collect()
    }
}
