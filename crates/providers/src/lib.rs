//! LLM provider implementations for Helmsman.
//!
//! All providers implement the `helmsman_core::Provider` trait.
//! [`build_from_config`] assembles the configured endpoint wrapped in the
//! retry decorator.

pub mod openai_compat;
pub mod retry;

pub use openai_compat::{OpenAiCompatProvider, parse_completion};
pub use retry::{RetryPolicy, RetryProvider};

use helmsman_config::AppConfig;
use helmsman_core::error::ProviderError;
use helmsman_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;

/// Retry policy derived from the `[orchestrator]` section.
pub fn retry_policy(config: &AppConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.orchestrator.retry_attempts,
        Duration::from_millis(config.orchestrator.retry_delay_ms),
    )
}

/// Build the configured provider, wrapped with retries.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider_config = &config.provider;
    let api_key = provider_config.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(
            "no API key; set provider.api_key or HELMSMAN_API_KEY".into(),
        )
    })?;

    let endpoint = OpenAiCompatProvider::with_timeout(
        &provider_config.name,
        &provider_config.api_url,
        api_key,
        Duration::from_secs(provider_config.timeout_secs),
    );

    Ok(Arc::new(RetryProvider::new(Arc::new(endpoint), retry_policy(config))))
}
