//! Per-key spacing of outbound operations
//!
//! A [`RateLimiter`] guarantees that successive acquisitions for the same
//! key are separated by at least the configured minimum delay. Keys are
//! independent: waiting on one hostname never delays another. There are no
//! token buckets or burst allowances - just a map from key to the next free
//! slot, protected by a mutex.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Cancelled;

/// Spaces successive operations per key by a minimum delay
///
/// Each concern constructs its own limiter (SEC fetches, URL scraping, API
/// fetches, embedding calls) with its own spacing; the key is the hostname
/// or provider tag within that concern.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    slots: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    /// Create a limiter spacing acquisitions for any single key by
    /// `min_delay`
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The configured minimum spacing
    pub const fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Reserve the next slot for `key` and return the instant it becomes
    /// available. Reserving up front keeps concurrent waiters on the same
    /// key spaced apart instead of releasing them in a burst.
    fn reserve(&self, key: &str) -> Instant {
        let now = Instant::now();
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            // A poisoned map only loses spacing history; recover the data
            Err(poisoned) => poisoned.into_inner(),
        };
        let slot = slots
            .get(key)
            .map_or(now, |previous| (*previous + self.min_delay).max(now));
        slots.insert(key.to_string(), slot);
        slot
    }

    /// Wait until the key's next slot is available
    pub async fn acquire(&self, key: &str) {
        if self.min_delay.is_zero() {
            return;
        }
        let slot = self.reserve(key);
        tokio::time::sleep_until(slot).await;
    }

    /// Wait for the key's next slot, aborting when the token fires
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the token fires before the slot opens. The
    /// reserved slot is kept, so spacing still holds for later callers.
    pub async fn acquire_cancellable(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        if self.min_delay.is_zero() {
            return Ok(());
        }
        let slot = self.reserve(key);
        tokio::select! {
            () = cancel.cancelled() => Err(Cancelled),
            () = tokio::time::sleep_until(slot) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn successive_acquisitions_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_millis(100));

        let start = Instant::now();
        limiter.acquire("example.com").await;
        let first = Instant::now();
        limiter.acquire("example.com").await;
        let second = Instant::now();
        limiter.acquire("example.com").await;
        let third = Instant::now();

        assert!(first - start < Duration::from_millis(100));
        assert!(second - first >= Duration::from_millis(100));
        assert!(third - second >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_millis(500));

        limiter.acquire("a.example").await;
        let start = Instant::now();
        limiter.acquire("b.example").await;
        // Different key: no wait
        assert!(Instant::now() - start < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_stay_spaced() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(100)));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire("sec.gov").await;
                Instant::now()
            }));
        }

        let mut completions = Vec::new();
        for handle in handles {
            completions.push(handle.await.unwrap());
        }
        completions.sort();
        for pair in completions.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_unblocks_waiter() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();

        limiter.acquire("slow.example").await;
        cancel.cancel();
        let result = limiter.acquire_cancellable("slow.example", &cancel).await;
        assert_eq!(result, Err(Cancelled));
    }

    #[tokio::test]
    async fn zero_delay_is_passthrough() {
        let limiter = RateLimiter::new(Duration::ZERO);
        limiter.acquire("anything").await;
        limiter.acquire("anything").await;
    }
}
