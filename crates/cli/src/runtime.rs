//! Wiring shared by the commands: config, stores, executor, orchestrator.

use helmsman_agent::{Orchestrator, OrchestratorSettings};
use helmsman_config::{AppConfig, ConfigError};
use helmsman_core::audit::AuditLog;
use helmsman_core::error::StoreError;
use helmsman_core::event::EventBus;
use helmsman_core::message::Conversation;
use helmsman_core::provider::Provider;
use helmsman_core::transcript::TranscriptStore;
use helmsman_store::{SqliteProjectResolver, SqliteStore};
use helmsman_tools::{ToolExecutor, TracingAuditLog, default_registry};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Load the default config, or `path` with the same env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let Some(path) = path else {
        return AppConfig::load();
    };
    let mut config = AppConfig::load_from(path)?;
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Open the transcript database, creating its directory if needed.
pub async fn open_store(config: &AppConfig) -> Result<SqliteStore, StoreError> {
    let path = &config.storage.database_path;
    if !path.to_string_lossy().starts_with("sqlite:") {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("create {}: {e}", parent.display())))?;
        }
    }
    SqliteStore::new(&config.storage.database_url()).await
}

pub fn build_executor(audit: Arc<dyn AuditLog>) -> ToolExecutor {
    ToolExecutor::new(
        Arc::new(default_registry()),
        Arc::new(TracingAuditLog::new(audit)),
    )
}

pub fn build_orchestrator(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    store: SqliteStore,
    events: Arc<EventBus>,
) -> Orchestrator {
    let store = Arc::new(store);
    let executor = Arc::new(build_executor(store.clone()));
    let projects = Arc::new(SqliteProjectResolver::new(config.storage.projects_dir.clone()));
    debug!(
        provider = provider.name(),
        model = %config.provider.model,
        projects_dir = %config.storage.projects_dir.display(),
        "Building orchestrator"
    );
    Orchestrator::new(
        provider,
        executor,
        store,
        events,
        OrchestratorSettings::from_config(config),
    )
    .with_projects(projects)
}

/// The conversation with `id`, if it belongs to `user`.
pub async fn owned_conversation(
    store: &dyn TranscriptStore,
    user: &str,
    id: &str,
) -> Result<Conversation, StoreError> {
    store
        .get_conversation(id)
        .await?
        .filter(|c| c.user_id == user)
        .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
}
