//! Bounded exponential backoff for outbound operations
//!
//! Stages never loop on failures themselves; they hand the operation to a
//! [`RetryPolicy`] which re-attempts only the kinds the taxonomy marks
//! retryable. The backoff sleep and the attempt itself both abort when the
//! job's cancellation token fires.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Cancelled, Classify, ErrorKind};

/// Parameters for bounded exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub multiplier: f64,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    /// Random fraction of the delay added as jitter (0.0 disables)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries, for call sites that only want the
    /// cancellation plumbing
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff delay preceding the given attempt (attempt numbering starts
    /// at 1; the delay is applied after attempt `n` fails)
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jittered = capped * self.jitter.mul_add(rand::random::<f64>(), 1.0);
        Duration::from_secs_f64(jittered)
    }

    /// Execute `op` with bounded retries
    ///
    /// `RateLimited` and `Transient` errors are retried up to
    /// `max_attempts`; `Internal` errors are retried exactly once; every
    /// other kind is terminal on the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, the error itself
    /// for terminal kinds, or `E::from(Cancelled)` when the token fires
    /// during an attempt or a backoff delay.
    pub async fn run<T, E, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<Cancelled>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            if cancel.is_cancelled() {
                return Err(E::from(Cancelled));
            }

            let result = tokio::select! {
                () = cancel.cancelled() => return Err(E::from(Cancelled)),
                result = op() => result,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let budget = match error.kind() {
                kind if kind.is_retryable() => self.max_attempts,
                // Unclassified failures get exactly one more try
                ErrorKind::Internal => self.max_attempts.min(2),
                _ => 1,
            };
            if attempt >= budget {
                return Err(error);
            }

            let delay = self.delay_for(attempt);
            tracing::debug!(
                attempt,
                max_attempts = budget,
                delay_ms = delay.as_millis() as u64,
                error = %error.kind(),
                "retrying after backoff"
            );
            tokio::select! {
                () = cancel.cancelled() => return Err(E::from(Cancelled)),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use thiserror::Error;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("throttled")]
        Throttled,
        #[error("bad input")]
        BadInput,
        #[error("boom")]
        Boom,
        #[error("cancelled")]
        Cancelled,
    }

    impl Classify for TestError {
        fn kind(&self) -> ErrorKind {
            match self {
                Self::Throttled => ErrorKind::RateLimited,
                Self::BadInput => ErrorKind::Validation,
                Self::Boom => ErrorKind::Internal,
                Self::Cancelled => ErrorKind::Cancelled,
            }
        }
    }

    impl From<Cancelled> for TestError {
        fn from(_: Cancelled) -> Self {
            Self::Cancelled
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(100),
            jitter: 0.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_error_succeeds_on_third_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let cancel = CancellationToken::new();

        let result: Result<u32, TestError> = fast_policy()
            .run(&cancel, || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TestError::Throttled)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_never_exceed_max() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let cancel = CancellationToken::new();

        let result: Result<(), TestError> = fast_policy()
            .run(&cancel, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Throttled)
                }
            })
            .await;

        assert!(matches!(result, Err(TestError::Throttled)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let cancel = CancellationToken::new();

        let result: Result<(), TestError> = fast_policy()
            .run(&cancel, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::BadInput)
                }
            })
            .await;

        assert!(matches!(result, Err(TestError::BadInput)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn internal_error_is_retried_exactly_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let cancel = CancellationToken::new();

        let result: Result<(), TestError> = fast_policy()
            .run(&cancel, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Boom)
                }
            })
            .await;

        assert!(matches!(result, Err(TestError::Boom)));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), TestError> = fast_policy()
            .run(&cancel, || async { Err(TestError::Throttled) })
            .await;

        assert!(matches!(result, Err(TestError::Cancelled)));
    }

    #[test]
    fn delays_grow_geometrically() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        // Capped at max_delay
        assert_eq!(policy.delay_for(12), Duration::from_secs(30));
    }
}
