//! Provider retry: bounded re-attempts with linear backoff.
//!
//! Wraps any provider. Transient failures (see
//! [`ProviderError::is_transient`]) are retried; attempt `n` is followed by
//! a sleep of `n * base_delay`. Everything else is returned immediately.

use async_trait::async_trait;
use helmsman_core::error::ProviderError;
use helmsman_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How many times to call and how long to wait between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the given 1-based failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// A provider that retries its inner provider on transient failures.
pub struct RetryProvider {
    inner: Arc<dyn helmsman_core::Provider>,
    policy: RetryPolicy,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn helmsman_core::Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl helmsman_core::Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        provider = %self.inner.name(),
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmsman_core::Provider;
    use helmsman_core::message::Message;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Returns scripted results in order, counting calls.
    struct ScriptedProvider {
        script: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(mut script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl helmsman_core::Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ProviderError::NotConfigured("script exhausted".into())))
        }
    }

    fn ok(text: &str) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: None,
            model: "mock".into(),
        })
    }

    fn gateway() -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::ApiError {
            status_code: 502,
            message: "Bad Gateway".into(),
        })
    }

    fn request() -> ProviderRequest {
        ProviderRequest::new("mock", vec![Message::user("hi")])
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_then_success() {
        let inner = Arc::new(ScriptedProvider::new(vec![gateway(), ok("recovered")]));
        let provider = RetryProvider::new(inner.clone(), RetryPolicy::default());

        let started = tokio::time::Instant::now();
        let resp = provider.complete(request()).await.unwrap();
        assert_eq!(resp.message.content, "recovered");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_last_error() {
        let inner = Arc::new(ScriptedProvider::new(vec![
            gateway(),
            Err(ProviderError::MalformedResponse("<html>".into())),
            gateway(),
            ok("too late"),
        ]));
        let provider = RetryProvider::new(inner.clone(), RetryPolicy::default());

        let started = tokio::time::Instant::now();
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 502, .. }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        // 1s after the first attempt, 2s after the second
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_error_not_retried() {
        let inner = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::InvalidResponse("No choices in response".into())),
            ok("unreachable"),
        ]));
        let provider = RetryProvider::new(inner.clone(), RetryPolicy::default());

        let err = provider.complete(request()).await.unwrap_err();
        assert!(err.is_protocol());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_not_retried() {
        let inner = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::AuthenticationFailed("bad key".into())),
            ok("unreachable"),
        ]));
        let provider = RetryProvider::new(inner.clone(), RetryPolicy::default());

        assert!(provider.complete(request()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
