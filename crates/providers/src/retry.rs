//! Exponential backoff for transient provider failures.
//!
//! The delay before the zero-based n-th retry is `base_delay * 2^n`, so
//! with the defaults (3 retries, 1000 ms) an operation is attempted at most
//! four times, waiting 1 s, 2 s and 4 s in between. Non-transient errors
//! are returned immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use labprompt_config::RetryConfig;
use labprompt_core::error::ProviderError;
use labprompt_core::provider::{GenerateRequest, GenerateResponse, Provider};
use tracing::{debug, warn};

/// Whether an error is worth retrying.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for ProviderError {
    fn is_transient(&self) -> bool {
        ProviderError::is_transient(self)
    }
}

impl Retryable for labprompt_core::Error {
    fn is_transient(&self) -> bool {
        labprompt_core::Error::is_transient(self)
    }
}

/// Retry budget and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
        )
    }

    /// Delay before the zero-based `retry`-th retry.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// retry budget is spent. The last error is returned unchanged.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retry = 0;
    loop {
        match op().await {
            Ok(value) => {
                if retry > 0 {
                    debug!(retries = retry, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                warn!(
                    error = %e,
                    attempt = retry + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Transient provider failure, backing off"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A provider that retries transient failures of the provider it wraps.
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Same provider, different retry budget.
    pub fn with_policy(self, policy: RetryPolicy) -> Self {
        Self { policy, ..self }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError> {
        with_retry(&self.policy, || self.inner.generate(request.clone())).await
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> ProviderError {
        ProviderError::ApiError {
            status_code: 503,
            message: "UNAVAILABLE: The model is overloaded.".into(),
        }
    }

    #[test]
    fn default_policy() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries, 3);
        assert_eq!(p.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn delays_double() {
        let p = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn from_config() {
        let cfg = RetryConfig {
            max_retries: 5,
            base_delay_ms: 250,
        };
        let p = RetryPolicy::from_config(&cfg);
        assert_eq!(p, RetryPolicy::new(5, Duration::from_millis(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let start = tokio::time::Instant::now();

        let result: Result<&str, ProviderError> = with_retry(&policy, || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err(unavailable()) } else { Ok("done") }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100 ms + 200 ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let result: Result<(), ProviderError> = with_retry(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::AuthenticationFailed(
                    "PERMISSION_DENIED".into(),
                ))
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(ProviderError::AuthenticationFailed(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        let result: Result<(), ProviderError> = with_retry(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            }
        })
        .await;

        assert_eq!(result.unwrap_err().status_code(), Some(503));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(0, Duration::from_millis(10));

        let _: Result<(), ProviderError> = with_retry(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn core_errors_use_provider_predicate() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(1, Duration::from_millis(10));

        let result: Result<(), labprompt_core::Error> = with_retry(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(labprompt_core::Error::Provider(ProviderError::Network(
                    "rate limit reached, try again later".into(),
                )))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct FlakyProvider {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(
            &self,
            request: GenerateRequest,
        ) -> std::result::Result<GenerateResponse, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(unavailable())
            } else {
                Ok(GenerateResponse::from_text(request.model, "ok"))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn decorator_retries_wrapped_provider() {
        let inner = Arc::new(FlakyProvider {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let provider =
            RetryingProvider::new(inner.clone(), RetryPolicy::new(3, Duration::from_millis(5)));

        assert_eq!(provider.name(), "flaky");
        let response = provider
            .generate(GenerateRequest::text("m", "hi"))
            .await
            .unwrap();
        assert_eq!(response.text.as_deref(), Some("ok"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_policy_applies_to_wrapped_provider() {
        let inner = Arc::new(FlakyProvider {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let provider = RetryingProvider::new(inner.clone(), RetryPolicy::default())
            .with_policy(RetryPolicy::new(0, Duration::from_millis(5)));

        assert_eq!(provider.policy().max_retries, 0);
        assert!(provider.generate(GenerateRequest::text("m", "hi")).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
