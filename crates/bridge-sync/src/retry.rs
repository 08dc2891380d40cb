//! # Retry Strategy
//!
//! Exponential backoff with jitter for transient failures.
//!
//! ## Backoff Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              delay(n) = min(base × 2^(n-1), max) + jitter               │
//! │                                                                         │
//! │  attempt:   1      2      3      4      5                               │
//! │  delay:     1s     2s     4s     8s     (no sleep after the last)       │
//! │  jitter:    +0..10% of the computed delay, uniform                      │
//! │  cap:       60s                                                         │
//! │                                                                         │
//! │  Non-retryable error  → returned immediately, no further attempts       │
//! │  Attempts exhausted   → the LAST error is surfaced, not a wrapper       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// Retry policy for operations returning [`SyncResult`].
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryStrategy {
    /// Creates a strategy with explicit bounds. `max_attempts` includes the
    /// first try and is clamped to at least 1.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        RetryStrategy {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Computes the sleep before the given retry (attempt is 1-based:
    /// the delay slept after attempt `n` failed).
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let raw = self.base_delay.saturating_mul(1u32 << exp);
        let capped = raw.min(self.max_delay);
        let jitter = capped.mul_f64(0.1 * rand::thread_rng().gen::<f64>());
        capped + jitter
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// exhausts the attempt budget. Uses [`SyncError::is_retryable`] as the
    /// predicate.
    pub async fn execute<T, F, Fut>(&self, operation: &str, op: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        self.execute_with(operation, op, SyncError::is_retryable).await
    }

    /// Same as [`execute`](Self::execute) with a caller-supplied predicate
    /// deciding which errors are worth another attempt.
    pub async fn execute_with<T, F, Fut, P>(
        &self,
        operation: &str,
        mut op: F,
        should_retry: P,
    ) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
        P: Fn(&SyncError) -> bool,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.max_attempts && should_retry(&err) => {
                    let delay = self.calculate_backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if should_retry(&err) {
                        warn!(operation, attempts = attempt, error = %err, "Retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_grows_then_caps() {
        let strategy = RetryStrategy::default();
        let base = Duration::from_secs(1);

        for attempt in 1..=6u32 {
            let expected = base
                .saturating_mul(1u32 << (attempt - 1))
                .min(Duration::from_secs(60));
            let delay = strategy.calculate_backoff(attempt);
            // Within [expected, expected * 1.1] once jitter is added
            assert!(delay >= expected, "attempt {attempt}: {delay:?} < {expected:?}");
            assert!(
                delay <= expected.mul_f64(1.1),
                "attempt {attempt}: {delay:?} above jitter band"
            );
        }

        // Deep attempts stay within the cap band
        let deep = strategy.calculate_backoff(30);
        assert!(deep <= Duration::from_secs(66));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let strategy = RetryStrategy::default();
        let calls = AtomicU32::new(0);

        let result = strategy
            .execute("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(SyncError::ConnectionFailed("refused".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let strategy = RetryStrategy::default();
        let calls = AtomicU32::new(0);

        let result: SyncResult<()> = strategy
            .execute("rejected", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SyncError::ApiStatus {
                        status: 422,
                        body: "bad payload".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(SyncError::ApiStatus { status: 422, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_last_error_after_max_attempts() {
        let strategy = RetryStrategy::new(5, Duration::from_millis(10), Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result: SyncResult<()> = strategy
            .execute("down", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(SyncError::ServerError { status: 500 + n as u16 }) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // The fifth attempt's error comes back untouched
        assert!(matches!(result, Err(SyncError::ServerError { status: 505 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_predicate_overrides_default() {
        let strategy = RetryStrategy::new(3, Duration::from_millis(1), Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        // AuthFailed is normally terminal; the predicate retries it anyway
        let result: SyncResult<()> = strategy
            .execute_with(
                "stubborn",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(SyncError::AuthFailed("expired".into())) }
                },
                |_| true,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
