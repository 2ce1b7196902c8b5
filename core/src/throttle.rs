//! FIFO request throttle enforcing a minimum interval between dispatches.
//!
//! One [`RequestThrottle`] is meant to be created once and shared by cloning
//! the handle; every clone serialises through the same queue and clock.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Cancelled;

#[derive(Debug, Default)]
struct ThrottleState {
    last_dispatch: Option<Instant>,
}

#[derive(Debug, Default)]
struct Shared {
    /// Held for the whole dispatch; tokio's mutex queues waiters in FIFO order.
    state: Mutex<ThrottleState>,
    pending: AtomicUsize,
    dispatched: AtomicU64,
}

/// Serialises operations so that no two start less than `min_interval` apart.
#[derive(Debug, Clone, Default)]
pub struct RequestThrottle {
    min_interval: Duration,
    shared: Arc<Shared>,
}

/// Decrements the pending counter however the wait ends.
struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RequestThrottle {
    /// Creates a throttle with the given minimum interval between dispatches.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Creates a throttle admitting at most `rps` dispatches per second.
    ///
    /// Non-positive or non-finite rates disable the interval.
    #[must_use]
    pub fn from_requests_per_second(rps: f64) -> Self {
        let interval = if rps.is_finite() && rps > 0.0 {
            Duration::try_from_secs_f64(1.0 / rps).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        Self::new(interval)
    }

    /// A throttle that still serialises dispatch but never waits.
    #[must_use]
    pub fn unthrottled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Minimum spacing between two dispatches.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Callers currently queued or waiting for their slot.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Total operations dispatched through this throttle.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.shared.dispatched.load(Ordering::SeqCst)
    }

    /// Queues `operation`, waits for its turn and interval, then runs it to
    /// completion before the next queued caller may start.
    ///
    /// Cancelling `cancel` while queued or waiting removes the entry without
    /// running it and leaves the shared dispatch clock untouched. Once the
    /// operation has started it runs to completion.
    pub async fn admit<F, Fut, T>(&self, operation: F, cancel: &CancellationToken) -> Result<T, Cancelled>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let pending = PendingGuard::enter(&self.shared.pending);

        let mut state = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(event = "throttle_cancelled", stage = "queued", "throttle_cancelled");
                return Err(Cancelled);
            }
            guard = self.shared.state.lock() => guard,
        };

        if let Some(last) = state.last_dispatch {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(
                    event = "throttle_wait",
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "throttle_wait"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        tracing::debug!(event = "throttle_cancelled", stage = "waiting", "throttle_cancelled");
                        return Err(Cancelled);
                    }
                    () = tokio::time::sleep(wait) => {}
                }
            }
        }

        state.last_dispatch = Some(Instant::now());
        drop(pending);
        let sequence = self.shared.dispatched.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(event = "throttle_dispatch", sequence, "throttle_dispatch");

        let output = operation().await;
        drop(state);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_requests_per_second() {
        assert_eq!(
            RequestThrottle::from_requests_per_second(4.0).min_interval(),
            Duration::from_millis(250)
        );
        assert_eq!(RequestThrottle::from_requests_per_second(0.0).min_interval(), Duration::ZERO);
        assert_eq!(
            RequestThrottle::from_requests_per_second(f64::NAN).min_interval(),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_dispatch_does_not_wait() {
        let throttle = RequestThrottle::new(Duration::from_secs(5));
        let start = Instant::now();
        let value = throttle.admit(|| async { 7 }, &CancellationToken::new()).await;
        assert_eq!(value, Ok(7));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(throttle.dispatched(), 1);
        assert_eq!(throttle.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_dispatches_are_spaced() {
        let throttle = RequestThrottle::new(Duration::from_millis(200));
        let cancel = CancellationToken::new();

        let first = throttle.admit(|| async { Instant::now() }, &cancel).await.unwrap();
        let second = throttle.admit(|| async { Instant::now() }, &cancel).await.unwrap();

        assert!(second - first >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_measured_from_dispatch_not_completion() {
        let throttle = RequestThrottle::new(Duration::from_millis(200));
        let cancel = CancellationToken::new();

        let first = throttle
            .admit(
                || async {
                    let started = Instant::now();
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    started
                },
                &cancel,
            )
            .await
            .unwrap();
        let second = throttle.admit(|| async { Instant::now() }, &cancel).await.unwrap();

        // The slow first call already used up the interval.
        assert_eq!(second - first, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_while_waiting_keeps_clock() {
        let throttle = RequestThrottle::new(Duration::from_millis(300));
        let cancel = CancellationToken::new();
        let first = throttle.admit(|| async { Instant::now() }, &cancel).await.unwrap();

        let aborted = CancellationToken::new();
        let trigger = aborted.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        let result = throttle
            .admit(|| async move { flag.store(true, Ordering::SeqCst) }, &aborted)
            .await;
        assert_eq!(result, Err(Cancelled));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(throttle.dispatched(), 1);

        let third = throttle.admit(|| async { Instant::now() }, &cancel).await.unwrap();
        assert_eq!(third - first, Duration::from_millis(300));
    }
}
