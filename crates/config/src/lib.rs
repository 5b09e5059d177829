//! Configuration loading and validation for Helmsman.
//!
//! Loads configuration from `~/.helmsman/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.helmsman/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM endpoint settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Loop bounds and prompt
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Where transcripts and project databases live
    #[serde(default)]
    pub storage: StorageConfig,
}

/// An OpenAI-compatible chat-completions endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name used in logs
    #[serde(default = "default_provider_name")]
    pub name: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request HTTP timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Bounds of the tool-calling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Model rounds before the forced tools-disabled call
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Newest transcript messages replayed to the model
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Attempts per model call, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff; attempt `n` waits `n * retry_delay_ms`
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_max_rounds() -> u32 {
    5
}
fn default_history_limit() -> usize {
    50
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_system_prompt() -> String {
    "You are a helpful assistant with access to tools for reading and updating the \
     user's project data. Call a tool whenever the answer depends on stored data, \
     and never invent records."
        .into()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            history_limit: default_history_limit(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file holding conversations, messages and the audit log
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory of per-project SQLite files (`<project_id>.db`)
    #[serde(default = "default_projects_dir")]
    pub projects_dir: PathBuf,
}

fn default_database_path() -> PathBuf {
    AppConfig::config_dir().join("helmsman.db")
}
fn default_projects_dir() -> PathBuf {
    AppConfig::config_dir().join("projects")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            projects_dir: default_projects_dir(),
        }
    }
}

impl StorageConfig {
    /// sqlx connection URL for the transcript database.
    pub fn database_url(&self) -> String {
        let path = self.database_path.to_string_lossy();
        if path.starts_with("sqlite:") {
            path.into_owned()
        } else {
            format!("sqlite://{path}?mode=rwc")
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.helmsman/config.toml).
    ///
    /// Environment variables override the file:
    /// - `HELMSMAN_API_KEY`, then `OPENAI_API_KEY`, then `OPENROUTER_API_KEY`
    ///   (only when the file sets no key)
    /// - `HELMSMAN_MODEL`
    /// - `HELMSMAN_API_URL`
    /// - `HELMSMAN_DATABASE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = lookup("HELMSMAN_API_KEY")
                .or_else(|| lookup("OPENAI_API_KEY"))
                .or_else(|| lookup("OPENROUTER_API_KEY"));
        }
        if let Some(model) = lookup("HELMSMAN_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = lookup("HELMSMAN_API_URL") {
            self.provider.api_url = url;
        }
        if let Some(path) = lookup("HELMSMAN_DATABASE") {
            self.storage.database_path = PathBuf::from(path);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".helmsman")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.orchestrator.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_rounds must be at least 1".into(),
            ));
        }
        if self.orchestrator.retry_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.retry_attempts must be at least 1".into(),
            ));
        }
        if self.orchestrator.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.history_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
