//! Token bucket rate limiter for metered model calls.
//!
//! Tokens refill continuously at `capacity` per minute, so the bucket never
//! resets in bursts at window boundaries. Refill and consume happen under one
//! lock, which keeps the limiter correct for OS threads and async tasks alike.

use crate::config::RateLimitConfig;
use crate::error::{ConfigError, SecurityError, SecurityResult};
use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const REFILL_WINDOW_SECS: f64 = 60.0;

/// Default pause between attempts while waiting for a token.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Mutable bucket state, always read and written together.
#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum tokens, and tokens refilled per minute.
    capacity: u32,
    bucket: Mutex<Bucket>,
    poll_interval: Duration,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests_per_minute` calls per minute,
    /// starting with a full bucket.
    pub fn new(max_requests_per_minute: NonZeroU32) -> Self {
        let capacity = max_requests_per_minute.get();
        info!("Rate limiter initialized: {} requests/minute", capacity);
        Self {
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Build a limiter from validated configuration.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        RateLimiterBuilder::new()
            .max_requests_per_minute(config.max_requests_per_minute)
            .build()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Take a token if one is available, without waiting.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            debug!(
                "Rate limit permit acquired: {:.2} tokens remaining",
                bucket.tokens
            );
            true
        } else {
            warn!("Rate limit exceeded");
            false
        }
    }

    /// Wait until a token is available.
    ///
    /// Dropping the returned future abandons the wait without consuming a token.
    pub async fn acquire(&self) {
        while !self.try_acquire() {
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Wait for a token, giving up after `deadline`.
    pub async fn acquire_timeout(&self, deadline: Duration) -> SecurityResult<()> {
        tokio::time::timeout(deadline, self.acquire())
            .await
            .map_err(|_| SecurityError::AcquireTimeout(deadline.as_millis() as u64))
    }

    /// Block the current thread until a token is available.
    ///
    /// For callers outside an async runtime.
    pub fn acquire_blocking(&self) {
        while !self.try_acquire() {
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Refill tokens based on elapsed time. Caller holds the bucket lock.
    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        let capacity = f64::from(self.capacity);

        let refill = elapsed * capacity / REFILL_WINDOW_SECS;
        bucket.tokens = (bucket.tokens + refill).min(capacity);
        bucket.last_refill = now;
    }

    /// Get current status.
    pub fn status(&self) -> RateLimitStatus {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);

        RateLimitStatus {
            available_tokens: bucket.tokens,
            capacity: self.capacity,
        }
    }
}

/// Rate limiter status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitStatus {
    pub available_tokens: f64,
    pub capacity: u32,
}

impl RateLimitStatus {
    /// Whole permits that could be granted right now.
    pub fn available_permits(&self) -> u32 {
        self.available_tokens.floor() as u32
    }

    pub fn utilization(&self) -> f64 {
        1.0 - (self.available_tokens / f64::from(self.capacity))
    }
}

/// Rate limiter builder.
pub struct RateLimiterBuilder {
    max_requests_per_minute: u32,
    poll_interval: Duration,
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl RateLimiterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_requests_per_minute(mut self, rate: u32) -> Self {
        self.max_requests_per_minute = rate;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Build the limiter. A zero rate is rejected.
    pub fn build(self) -> Result<RateLimiter, ConfigError> {
        let capacity =
            NonZeroU32::new(self.max_requests_per_minute).ok_or(ConfigError::InvalidValue {
                field: "max_requests_per_minute".into(),
                message: "Rate limit must be greater than 0".into(),
            })?;

        let mut limiter = RateLimiter::new(capacity);
        limiter.poll_interval = self.poll_interval;
        Ok(limiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn limiter(rate: u32) -> RateLimiter {
        RateLimiterBuilder::new()
            .max_requests_per_minute(rate)
            .build()
            .unwrap()
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = limiter(10);
        let status = limiter.status();
        assert_eq!(status.capacity, 10);
        assert_eq!(status.available_permits(), 10);
    }

    #[test]
    fn test_zero_rate_rejected() {
        let result = RateLimiterBuilder::new().max_requests_per_minute(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_from_config() {
        let config = RateLimitConfig {
            max_requests_per_minute: 5,
        };
        assert_eq!(RateLimiter::from_config(&config).unwrap().capacity(), 5);

        let config = RateLimitConfig {
            max_requests_per_minute: 0,
        };
        assert!(RateLimiter::from_config(&config).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_boundary() {
        let limiter = limiter(60);
        for _ in 0..60 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_continuous() {
        let limiter = limiter(60);
        for _ in 0..60 {
            assert!(limiter.try_acquire());
        }

        // Half a token after 500ms; nothing granted yet.
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!limiter.try_acquire());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.try_acquire());

        // A full window refills to capacity, never beyond it.
        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(limiter.status().available_permits(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denial_keeps_tokens() {
        let limiter = limiter(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        let before = limiter.status().available_tokens;
        assert!(!limiter.try_acquire());
        let after = limiter.status().available_tokens;
        assert_eq!(before, after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = limiter(60);
        for _ in 0..60 {
            assert!(limiter.try_acquire());
        }

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout() {
        let limiter = limiter(1);
        assert!(limiter.try_acquire());

        let result = limiter.acquire_timeout(Duration::from_millis(500)).await;
        assert_eq!(result, Err(SecurityError::AcquireTimeout(500)));

        // One token per minute; the deadline covers the refill.
        let result = limiter.acquire_timeout(Duration::from_secs(61)).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_wall_clock_refill() {
        let limiter = limiter(60);
        for _ in 0..60 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        std::thread::sleep(Duration::from_millis(1100));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_acquire_blocking_waits_for_refill() {
        let limiter = limiter(60);
        for _ in 0..60 {
            assert!(limiter.try_acquire());
        }

        let start = std::time::Instant::now();
        limiter.acquire_blocking();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(900), "{:?}", waited);
        assert!(waited < Duration::from_secs(5), "{:?}", waited);
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_acquire_blocking_across_threads() {
        const THREADS: u32 = 5;

        // 10 tokens per second.
        let limiter = Arc::new(
            RateLimiterBuilder::new()
                .max_requests_per_minute(600)
                .poll_interval(Duration::from_millis(5))
                .build()
                .unwrap(),
        );
        while limiter.try_acquire() {}

        let start = std::time::Instant::now();
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.acquire_blocking())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Five grants need five refilled tokens.
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(450), "{:?}", waited);
        assert!(limiter.status().available_tokens < 1.0);
    }

    #[test]
    fn test_concurrent_callers_never_overspend() {
        const CAPACITY: u32 = 50;
        const THREADS: usize = 8;

        let limiter = Arc::new(limiter(CAPACITY));
        let granted = Arc::new(AtomicU32::new(0));
        let start = std::time::Instant::now();

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let granted = Arc::clone(&granted);
                std::thread::spawn(move || {
                    let until = std::time::Instant::now() + Duration::from_millis(200);
                    while std::time::Instant::now() < until {
                        if limiter.try_acquire() {
                            granted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let elapsed = start.elapsed().as_secs_f64();
        let refilled = (elapsed / REFILL_WINDOW_SECS * f64::from(CAPACITY)).floor() as u32;
        let total = granted.load(Ordering::SeqCst);
        assert!(total >= CAPACITY);
        assert!(total <= CAPACITY + refilled, "granted {} permits", total);
    }

    #[test]
    fn test_status_utilization() {
        let limiter = limiter(4);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        let status = limiter.status();
        assert!(status.utilization() >= 0.49 && status.utilization() <= 0.5);
    }
}
