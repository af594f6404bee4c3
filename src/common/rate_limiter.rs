//! Token-bucket rate limiter for the market-data fetch boundary
//!
//! The bucket holds at most `max_requests_per_second` tokens and is refilled
//! to capacity once per `refill_interval`. Every outbound request consumes
//! one token; callers wait for the next refill when the bucket is empty.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Bucket capacity, i.e. requests allowed per refill interval
    pub max_requests_per_second: usize,
    pub refill_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: 10,
            refill_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    pub fn with_rate(mut self, requests_per_second: usize) -> Self {
        self.max_requests_per_second = requests_per_second.max(1);
        self
    }

    pub fn with_refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }
}

/// Shared token bucket. Clones share the same bucket.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    tokens: Arc<Semaphore>,
    capacity: usize,
    last_refill: Arc<Mutex<Instant>>,
    refill_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let capacity = config.max_requests_per_second.max(1);
        Self {
            tokens: Arc::new(Semaphore::new(capacity)),
            capacity,
            last_refill: Arc::new(Mutex::new(Instant::now())),
            refill_interval: config.refill_interval,
        }
    }

    pub fn with_rate(requests_per_second: usize) -> Self {
        Self::new(RateLimiterConfig::default().with_rate(requests_per_second))
    }

    /// Wait until a token is available and consume it.
    pub async fn acquire(&self) {
        loop {
            let next_refill = self.refill().await;
            if let Ok(token) = self.tokens.try_acquire() {
                token.forget();
                return;
            }
            tokio::time::sleep_until(next_refill).await;
        }
    }

    /// Consume a token if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        self.refill().await;
        match self.tokens.try_acquire() {
            Ok(token) => {
                token.forget();
                true
            }
            Err(_) => false,
        }
    }

    pub fn available(&self) -> usize {
        self.tokens.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Top the bucket up if an interval has elapsed. Returns the instant of
    /// the next scheduled refill.
    async fn refill(&self) -> Instant {
        let mut last = self.last_refill.lock().await;
        if last.elapsed() >= self.refill_interval {
            let missing = self.capacity.saturating_sub(self.tokens.available_permits());
            if missing > 0 {
                self.tokens.add_permits(missing);
            }
            *last = Instant::now();
        }
        *last + self.refill_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_is_clamped() {
        let limiter = RateLimiter::with_rate(0);
        assert_eq!(limiter.capacity(), 1);
    }

    #[tokio::test]
    async fn test_initial_bucket_is_full() {
        let limiter = RateLimiter::with_rate(5);
        assert_eq!(limiter.available(), 5);
        limiter.acquire().await;
        assert_eq!(limiter.available(), 4);
    }

    #[tokio::test]
    async fn test_try_acquire_exhausted() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::default()
                .with_rate(2)
                .with_refill_interval(Duration::from_secs(60)),
        );
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::default()
                .with_rate(1)
                .with_refill_interval(Duration::from_millis(50)),
        );
        let start = std::time::Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_clones_share_bucket() {
        let a = RateLimiter::with_rate(3);
        let b = a.clone();
        a.acquire().await;
        assert_eq!(b.available(), 2);
    }
}
