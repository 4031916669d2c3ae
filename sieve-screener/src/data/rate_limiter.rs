//! Token bucket rate limiter for provider request throttling.
//!
//! Every per-security provider call acquires a token first, so concurrent
//! evaluation paths share one request ceiling. A bucket of capacity 1 with a
//! refill period of `interval` enforces a minimum spacing between calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Tokens are stored scaled by this factor for sub-token precision.
const SCALE: u64 = 1000;

/// A token bucket rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum tokens in the bucket
    capacity: u32,
    /// Current available tokens (scaled)
    tokens: AtomicU64,
    /// Whole tokens added per millisecond
    refill_rate_per_ms: f64,
    /// Last refill timestamp
    last_refill: Mutex<Instant>,
    /// Name for logging
    name: String,
}

impl RateLimiter {
    /// Create a limiter that lets one request through per `interval`.
    pub fn with_min_interval(name: impl Into<String>, interval: Duration) -> Self {
        let interval_ms = (interval.as_secs_f64() * 1000.0).max(1.0);
        Self {
            capacity: 1,
            tokens: AtomicU64::new(SCALE),
            refill_rate_per_ms: 1.0 / interval_ms,
            last_refill: Mutex::new(Instant::now()),
            name: name.into(),
        }
    }

    /// Acquire a token, waiting if necessary.
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }

            let missing = SCALE.saturating_sub(self.tokens.load(Ordering::Relaxed)) as f64;
            let wait_ms = (missing / (self.refill_rate_per_ms * SCALE as f64)).ceil() as u64;
            let wait_time = Duration::from_millis(wait_ms.clamp(1, 1000));

            debug!(
                limiter = %self.name,
                wait_ms = wait_time.as_millis() as u64,
                "Rate limited, waiting for token"
            );

            tokio::time::sleep(wait_time).await;
        }
    }

    /// Try to acquire a token without waiting.
    pub fn try_acquire(&self) -> bool {
        self.refill();

        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            if current < SCALE {
                return false;
            }

            if self
                .tokens
                .compare_exchange_weak(current, current - SCALE, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&self) {
        // Skip when another caller is refilling
        let Ok(mut last_refill) = self.last_refill.try_lock() else {
            return;
        };

        let now = Instant::now();
        let elapsed_ms = now.duration_since(*last_refill).as_secs_f64() * 1000.0;
        let new_tokens = (elapsed_ms * self.refill_rate_per_ms * SCALE as f64) as u64;
        if new_tokens == 0 {
            return;
        }

        let max_tokens = self.capacity as u64 * SCALE;
        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            let new_value = (current + new_tokens).min(max_tokens);

            if current == new_value
                || self
                    .tokens
                    .compare_exchange_weak(current, new_value, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
            {
                break;
            }
        }

        *last_refill = now;
    }
}

/// Shared rate limiter that can be cloned.
pub type SharedRateLimiter = Arc<RateLimiter>;

/// Create a shared limiter enforcing a minimum spacing between requests.
pub fn shared_limiter(name: impl Into<String>, interval: Duration) -> SharedRateLimiter {
    Arc::new(RateLimiter::with_min_interval(name, interval))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_interval_allows_single_burst() {
        let limiter = RateLimiter::with_min_interval("test", Duration::from_millis(500));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_acquire_enforces_spacing() {
        let limiter = RateLimiter::with_min_interval("test", Duration::from_millis(40));
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;

        // Two further tokens need two refill periods (allow scheduler slack)
        assert!(start.elapsed() >= Duration::from_millis(70));
    }

    #[test]
    fn test_shared_limiter_blocks_across_clones() {
        let limiter = shared_limiter("test", Duration::from_secs(60));
        let other = Arc::clone(&limiter);
        assert!(tokio_test::block_on(async { limiter.try_acquire() }));
        assert!(!other.try_acquire());
    }
}
