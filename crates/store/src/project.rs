//! SQLite project stores: one database file per project.
//!
//! The resolver opens `<projects_dir>/<project_id>.db` on first use and keeps
//! the pool for later requests. Rows come back as JSON objects keyed by
//! column name.

use async_trait::async_trait;
use futures::TryStreamExt;
use helmsman_core::error::StoreError;
use helmsman_core::project::{ProjectStore, ProjectStoreResolver, Row as JsonRow, TableSummary};
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

type Query<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// A project store over one SQLite pool.
pub struct SqliteProjectStore {
    project_id: String,
    pool: SqlitePool,
}

impl SqliteProjectStore {
    pub fn new(project_id: impl Into<String>, pool: SqlitePool) -> Self {
        Self {
            project_id: project_id.into(),
            pool,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_value<'q>(query: Query<'q>, value: &Value) -> Query<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn bind_all<'q>(statement: &'q str, params: &[Value]) -> Query<'q> {
    params
        .iter()
        .fold(sqlx::query(statement), |query, value| bind_value(query, value))
}

fn column_value(row: &SqliteRow, idx: usize) -> Value {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(idx).map(Value::from).unwrap_or(Value::Null),
        "REAL" | "NUMERIC" => row.try_get::<f64, _>(idx).map(Value::from).unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            .unwrap_or(Value::Null),
        _ => row.try_get::<String, _>(idx).map(Value::String).unwrap_or(Value::Null),
    }
}

fn row_to_json(row: &SqliteRow) -> JsonRow {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| (col.name().to_string(), column_value(row, idx)))
        .collect()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl ProjectStore for SqliteProjectStore {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn query(&self, statement: &str, params: &[Value]) -> Result<Vec<JsonRow>, StoreError> {
        let rows = bind_all(statement, params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        debug!(project_id = %self.project_id, rows = rows.len(), "Project query");
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn query_capped(
        &self,
        statement: &str,
        params: &[Value],
        max_rows: usize,
    ) -> Result<Vec<JsonRow>, StoreError> {
        let mut stream = bind_all(statement, params).fetch(&self.pool);
        let mut rows = Vec::new();
        while rows.len() < max_rows {
            match stream
                .try_next()
                .await
                .map_err(|e| StoreError::QueryFailed(e.to_string()))?
            {
                Some(row) => rows.push(row_to_json(&row)),
                None => break,
            }
        }
        debug!(project_id = %self.project_id, rows = rows.len(), max_rows, "Capped project query");
        Ok(rows)
    }

    async fn execute(&self, statement: &str, params: &[Value]) -> Result<u64, StoreError> {
        let result = bind_all(statement, params)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        debug!(project_id = %self.project_id, affected = result.rows_affected(), "Project write");
        Ok(result.rows_affected())
    }

    async fn describe(&self) -> Result<Vec<TableSummary>, StoreError> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("table listing: {e}")))?;

        let mut summaries = Vec::with_capacity(tables.len());
        for name in tables {
            let columns: Vec<String> =
                sqlx::query_scalar("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
                    .bind(&name)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StoreError::QueryFailed(format!("columns of {name}: {e}")))?;

            let count_sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&name));
            let row_count: i64 = sqlx::query_scalar(&count_sql)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("row count of {name}: {e}")))?;

            summaries.push(TableSummary {
                name,
                columns,
                row_count: u64::try_from(row_count).unwrap_or(0),
            });
        }
        Ok(summaries)
    }
}

/// Project ids become file names, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_project_id(project_id: &str) -> Result<(), StoreError> {
    let valid = !project_id.is_empty()
        && project_id.len() <= 128
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidProject(project_id.to_string()))
    }
}

/// Resolves project ids to SQLite files under one directory.
pub struct SqliteProjectResolver {
    projects_dir: PathBuf,
    create_missing: bool,
    pools: Mutex<HashMap<String, Arc<SqliteProjectStore>>>,
}

impl SqliteProjectResolver {
    /// Files that do not exist yet are reported as `InvalidProject`.
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            create_missing: false,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Create empty databases for unknown project ids instead of failing.
    pub fn create_missing(mut self, create: bool) -> Self {
        self.create_missing = create;
        self
    }

    pub fn db_path(&self, project_id: &str) -> PathBuf {
        self.projects_dir.join(format!("{project_id}.db"))
    }

    async fn open(&self, project_id: &str) -> Result<Arc<SqliteProjectStore>, StoreError> {
        let path = self.db_path(project_id);
        if !self.create_missing && !path.exists() {
            return Err(StoreError::InvalidProject(format!(
                "{project_id} (no database at {})",
                path.display()
            )));
        }
        if self.create_missing {
            std::fs::create_dir_all(&self.projects_dir).map_err(|e| {
                StoreError::Storage(format!("create {}: {e}", self.projects_dir.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(self.create_missing)
            .pragma("foreign_keys", "ON");
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open project {project_id}: {e}")))?;

        info!(project_id, path = %path.display(), "Opened project store");
        Ok(Arc::new(SqliteProjectStore::new(project_id, pool)))
    }
}

#[async_trait]
impl ProjectStoreResolver for SqliteProjectResolver {
    async fn resolve(&self, project_id: &str) -> Result<Arc<dyn ProjectStore>, StoreError> {
        validate_project_id(project_id)?;

        let mut pools = self.pools.lock().await;
        if let Some(store) = pools.get(project_id) {
            return Ok(store.clone());
        }
        let store = self.open(project_id).await?;
        pools.insert(project_id.to_string(), store.clone());
        Ok(store)
    }
}
