//! Exponential backoff for transient provider failures.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::error::Cancelled;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    /// Returns true for rate-limit and transient network failures.
    fn is_transient(&self) -> bool;
}

/// Runs a fallible async operation under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct BackoffRetrier {
    policy: RetryPolicy,
}

impl BackoffRetrier {
    /// Creates a retrier for the given policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy this retrier applies.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    ///
    /// Transient errors are followed by a backoff sleep; any other error is
    /// returned unchanged on the spot. After `max_attempts` the last error is
    /// returned unchanged. Cancelling `cancel` during a backoff sleep returns
    /// `E::from(Cancelled)` without another attempt.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F, cancel: &CancellationToken) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + From<Cancelled> + std::fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_transient() {
                tracing::debug!(
                    event = "retry_not_attempted",
                    attempt,
                    error = %error,
                    "permanent error, not retrying"
                );
                return Err(error);
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    event = "retry_exhausted",
                    attempt,
                    max_attempts,
                    error = %error,
                    "retry_exhausted"
                );
                return Err(error);
            }

            let delay = self.policy.delay_for(attempt - 1);
            tracing::warn!(
                event = "retry_scheduled",
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "transient error, backing off"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(E::from(Cancelled)),
                () = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(4)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(250))
            .with_backoff_factor(2.0)
    }

    /// Fails with `error` for the first `failures` calls, then succeeds.
    fn flaky(
        calls: Arc<AtomicU32>,
        failures: u32,
        error: ProviderError,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, ProviderError>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                std::future::ready(Err(error.clone()))
            } else {
                std::future::ready(Ok(n))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt_has_no_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let result = BackoffRetrier::new(policy())
            .run(flaky(calls.clone(), 0, ProviderError::Network("x".into())), &CancellationToken::new())
            .await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let result = BackoffRetrier::new(policy())
            .run(
                flaky(calls.clone(), 3, ProviderError::RateLimited("slow down".into())),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result, Ok(4));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 100 + 200 + 250 (capped)
        assert_eq!(start.elapsed(), Duration::from_millis(550));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = BackoffRetrier::new(policy())
            .run(
                flaky(calls.clone(), u32::MAX, ProviderError::Network("reset".into())),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result, Err(ProviderError::Network("reset".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = BackoffRetrier::new(policy())
            .run(
                flaky(calls.clone(), u32::MAX, ProviderError::Permanent("401".into())),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result, Err(ProviderError::Permanent("401".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = BackoffRetrier::new(policy())
            .run(flaky(calls.clone(), u32::MAX, ProviderError::Network("reset".into())), &cancel)
            .await;

        assert_eq!(result, Err(ProviderError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
