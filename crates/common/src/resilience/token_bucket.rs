//! Token bucket rate limiter
//!
//! A bucket holds up to `capacity` tokens (requests per minute times the
//! burst multiplier) and refills continuously at `requests_per_minute / 60`
//! tokens per second. Each admitted request consumes tokens, so a burst up
//! to capacity is allowed and the steady state converges on the configured
//! rate.
//!
//! Refill, check and subtract happen under one per-bucket mutex; the
//! counters are plain atomics so status snapshots never contend with
//! admission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::clock::{SharedClock, SystemClock};
use crate::error::{ConfigError, ConfigResult};

/// Longest single sleep inside [`TokenBucket::wait_and_acquire`].
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest single sleep inside [`TokenBucket::wait_and_acquire`].
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Deadline used when `now + timeout` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Configuration for token bucket rate limiter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucketConfig {
    /// Steady-state admission rate
    pub requests_per_minute: u32,
    /// Capacity as a multiple of `requests_per_minute`
    pub burst_multiplier: f64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self { requests_per_minute: 60, burst_multiplier: 1.5 }
    }
}

impl TokenBucketConfig {
    /// Create a configuration for `requests_per_minute` with the given burst.
    pub fn new(requests_per_minute: u32, burst_multiplier: f64) -> Self {
        Self { requests_per_minute, burst_multiplier }
    }

    /// Create a new configuration builder
    pub fn builder() -> TokenBucketConfigBuilder {
        TokenBucketConfigBuilder::new()
    }

    /// Maximum number of tokens the bucket can hold
    pub fn capacity(&self) -> f64 {
        f64::from(self.requests_per_minute) * self.burst_multiplier
    }

    /// Tokens added per second of elapsed time
    pub fn refill_rate_per_second(&self) -> f64 {
        f64::from(self.requests_per_minute) / 60.0
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.requests_per_minute == 0 {
            return Err(ConfigError::invalid("requests_per_minute must be greater than 0"));
        }
        if !self.burst_multiplier.is_finite() || self.burst_multiplier <= 0.0 {
            return Err(ConfigError::invalid("burst_multiplier must be a positive number"));
        }
        if self.capacity() < 1.0 {
            return Err(ConfigError::invalid(
                "requests_per_minute * burst_multiplier must allow at least one token",
            ));
        }
        Ok(())
    }
}

/// Builder for TokenBucketConfig
#[derive(Debug)]
pub struct TokenBucketConfigBuilder {
    config: TokenBucketConfig,
}

impl Default for TokenBucketConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBucketConfigBuilder {
    pub fn new() -> Self {
        Self { config: TokenBucketConfig::default() }
    }

    pub fn requests_per_minute(mut self, rpm: u32) -> Self {
        self.config.requests_per_minute = rpm;
        self
    }

    pub fn burst_multiplier(mut self, multiplier: f64) -> Self {
        self.config.burst_multiplier = multiplier;
        self
    }

    pub fn build(self) -> ConfigResult<TokenBucketConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Read-only snapshot of a bucket, for health endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBucketStatus {
    pub tokens_available: f64,
    pub capacity: f64,
    pub refill_rate_per_second: f64,
    pub requests_per_minute: u32,
    pub total_acquired: u64,
    pub total_rejected: u64,
}

#[derive(Debug)]
struct BucketState {
    config: TokenBucketConfig,
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Time until `requested` tokens will be available, assuming no other taker.
    fn time_until(&self, requested: f64) -> Duration {
        let missing = (requested - self.tokens).max(0.0);
        Duration::from_secs_f64(missing / self.refill_rate)
    }
}

/// Token bucket rate limiter
///
/// # Examples
///
/// ```rust
/// use hearth_common::resilience::{TokenBucket, TokenBucketConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = TokenBucket::new(TokenBucketConfig::new(60, 2.0))?;
///
/// if limiter.acquire(1) {
///     println!("Request allowed");
/// } else {
///     println!("Rate limit exceeded");
/// }
/// # Ok(())
/// # }
/// ```
pub struct TokenBucket {
    state: Mutex<BucketState>,
    total_acquired: AtomicU64,
    total_rejected: AtomicU64,
    clock: SharedClock,
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket").field("status", &self.status()).finish()
    }
}

impl TokenBucket {
    /// Create a new token bucket with system clock
    pub fn new(config: TokenBucketConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a new token bucket with custom clock; starts full.
    pub fn with_clock(config: TokenBucketConfig, clock: SharedClock) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(config, clock))
    }

    /// Build from a config the caller has already validated.
    pub(crate) fn from_validated(config: TokenBucketConfig, clock: SharedClock) -> Self {
        let capacity = config.capacity();

        Self {
            state: Mutex::new(BucketState {
                config,
                capacity,
                refill_rate: config.refill_rate_per_second(),
                tokens: capacity,
                last_refill: clock.now(),
            }),
            total_acquired: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            clock,
        }
    }

    /// Refill, then take `tokens` if available. Counters are untouched.
    fn try_take(&self, tokens: u32) -> Result<(), Duration> {
        let requested = f64::from(tokens);
        let mut state = self.state.lock();
        state.refill(self.clock.now());

        if state.tokens >= requested {
            state.tokens -= requested;
            debug!(requested = tokens, remaining = state.tokens, "Acquired tokens");
            Ok(())
        } else {
            debug!(requested = tokens, available = state.tokens, "Rate limit: insufficient tokens");
            Err(state.time_until(requested))
        }
    }

    /// Try to acquire the specified number of tokens
    ///
    /// Returns `true` if tokens were acquired, `false` if not enough tokens
    /// are available. A request larger than the capacity can never succeed.
    pub fn acquire(&self, tokens: u32) -> bool {
        match self.try_take(tokens) {
            Ok(()) => {
                self.total_acquired.fetch_add(u64::from(tokens), Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Acquire tokens, polling until they are available or `timeout` elapses
    ///
    /// Sleeps between polls for the estimated time to the next token, capped
    /// at [`MAX_POLL_INTERVAL`] and floored at [`MIN_POLL_INTERVAL`], and never
    /// past the deadline. Dropping the future cancels the wait without
    /// touching the bucket; tokens acquired before cancellation are not
    /// returned.
    pub async fn wait_and_acquire(&self, tokens: u32, timeout: Duration) -> bool {
        let now = tokio::time::Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE);

        loop {
            let wait_hint = match self.try_take(tokens) {
                Ok(()) => {
                    self.total_acquired.fetch_add(u64::from(tokens), Ordering::Relaxed);
                    return true;
                }
                Err(hint) => hint,
            };

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                debug!(requested = tokens, ?timeout, "Timed out waiting for tokens");
                return false;
            }

            let pause = wait_hint.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL).min(remaining);
            tokio::time::sleep(pause).await;
        }
    }

    /// Replace the rate, keeping the burst multiplier
    ///
    /// Current tokens are clamped to the new capacity rather than reset, so
    /// a config change never grants a fresh burst.
    pub fn update_config(&self, requests_per_minute: u32) -> ConfigResult<()> {
        let burst_multiplier = self.state.lock().config.burst_multiplier;
        self.update(TokenBucketConfig { requests_per_minute, burst_multiplier })
    }

    /// Replace the whole configuration (same clamping as [`Self::update_config`]).
    pub fn update(&self, config: TokenBucketConfig) -> ConfigResult<()> {
        config.validate()?;
        let mut state = self.state.lock();
        state.refill(self.clock.now());
        state.config = config;
        state.capacity = config.capacity();
        state.refill_rate = config.refill_rate_per_second();
        state.tokens = state.tokens.min(state.capacity);
        Ok(())
    }

    /// Refill the bucket to capacity and zero its counters
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = state.capacity;
        state.last_refill = self.clock.now();
        self.total_acquired.store(0, Ordering::Relaxed);
        self.total_rejected.store(0, Ordering::Relaxed);
    }

    /// Get the current number of available tokens
    pub fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock();
        state.refill(self.clock.now());
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.state.lock().capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.state.lock().refill_rate
    }

    pub fn config(&self) -> TokenBucketConfig {
        self.state.lock().config
    }

    pub fn total_acquired(&self) -> u64 {
        self.total_acquired.load(Ordering::Relaxed)
    }

    pub fn total_rejected(&self) -> u64 {
        self.total_rejected.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> TokenBucketStatus {
        let mut state = self.state.lock();
        state.refill(self.clock.now());
        TokenBucketStatus {
            tokens_available: state.tokens,
            capacity: state.capacity,
            refill_rate_per_second: state.refill_rate,
            requests_per_minute: state.config.requests_per_minute,
            total_acquired: self.total_acquired(),
            total_rejected: self.total_rejected(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::clock::MockClock;
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn mock_bucket(rpm: u32, burst: f64) -> (TokenBucket, MockClock) {
        let clock = MockClock::new();
        let bucket = TokenBucket::with_clock(TokenBucketConfig::new(rpm, burst), clock.shared())
            .expect("valid bucket config");
        (bucket, clock)
    }

    #[test]
    fn test_token_bucket_basic() {
        let (bucket, _clock) = mock_bucket(10, 1.0);

        assert!(bucket.acquire(5));
        assert!((bucket.available_tokens() - 5.0).abs() < EPSILON);

        assert!(bucket.acquire(5));
        assert!(bucket.available_tokens().abs() < EPSILON);

        assert!(!bucket.acquire(1));
        assert_eq!(bucket.total_acquired(), 10);
        assert_eq!(bucket.total_rejected(), 1);
    }

    #[test]
    fn test_burst_then_throttle() {
        let (bucket, clock) = mock_bucket(60, 2.0);
        assert!((bucket.capacity() - 120.0).abs() < EPSILON);
        assert!((bucket.refill_rate() - 1.0).abs() < EPSILON);

        for i in 0..120 {
            assert!(bucket.acquire(1), "burst acquire {i} should succeed");
        }
        assert!(!bucket.acquire(1), "121st acquire should be rejected");

        clock.advance(Duration::from_secs(1));
        assert!(bucket.acquire(1));
        assert!(!bucket.acquire(1));
    }

    #[test]
    fn test_refill_is_linear_and_capped() {
        let (bucket, clock) = mock_bucket(60, 2.0);
        assert!(bucket.acquire(100));
        let before = bucket.available_tokens();

        clock.advance(Duration::from_millis(2500));
        let expected = (before + 2.5).min(120.0);
        assert!((bucket.available_tokens() - expected).abs() < EPSILON);

        clock.advance(Duration::from_secs(600));
        assert!((bucket.available_tokens() - 120.0).abs() < EPSILON);
    }

    #[test]
    fn test_request_larger_than_capacity_is_rejected() {
        let (bucket, _clock) = mock_bucket(10, 1.0);
        assert!(!bucket.acquire(11));
        assert!((bucket.available_tokens() - 10.0).abs() < EPSILON);
    }

    #[test]
    fn test_update_config_clamps_without_refilling() {
        let (bucket, _clock) = mock_bucket(60, 2.0);
        assert!(bucket.acquire(20));

        // Shrinking clamps the 100 remaining tokens to the new capacity of 20
        bucket.update_config(10).expect("valid rate");
        assert!((bucket.capacity() - 20.0).abs() < EPSILON);
        assert!((bucket.available_tokens() - 20.0).abs() < EPSILON);

        // Growing keeps the current level instead of granting a burst
        bucket.update_config(120).expect("valid rate");
        assert!((bucket.capacity() - 240.0).abs() < EPSILON);
        assert!((bucket.available_tokens() - 20.0).abs() < EPSILON);
        assert!((bucket.refill_rate() - 2.0).abs() < EPSILON);
        assert!((bucket.config().burst_multiplier - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_update_config_rejects_zero_rate() {
        let (bucket, _clock) = mock_bucket(60, 1.0);
        assert!(bucket.update_config(0).is_err());
        assert_eq!(bucket.config().requests_per_minute, 60);
    }

    #[test]
    fn test_reset_restores_capacity_and_counters() {
        let (bucket, _clock) = mock_bucket(5, 1.0);
        for _ in 0..6 {
            bucket.acquire(1);
        }
        bucket.reset();

        let status = bucket.status();
        assert!((status.tokens_available - 5.0).abs() < EPSILON);
        assert_eq!(status.total_acquired, 0);
        assert_eq!(status.total_rejected, 0);
    }

    #[test]
    fn test_token_bucket_config_validation() {
        assert!(TokenBucketConfig::builder().requests_per_minute(0).build().is_err());
        assert!(TokenBucketConfig::builder().burst_multiplier(0.0).build().is_err());
        assert!(TokenBucketConfig::builder().burst_multiplier(-1.0).build().is_err());
        assert!(TokenBucketConfig::builder().burst_multiplier(f64::NAN).build().is_err());
        assert!(TokenBucketConfig::builder()
            .requests_per_minute(1)
            .burst_multiplier(0.5)
            .build()
            .is_err());
        assert!(TokenBucketConfig::builder().requests_per_minute(30).build().is_ok());
    }

    #[tokio::test]
    async fn test_wait_and_acquire_succeeds_after_refill() {
        // 600 rpm = 10 tokens per second
        let bucket =
            TokenBucket::new(TokenBucketConfig::new(600, 1.0)).expect("valid bucket config");
        while bucket.acquire(1) {}

        let started = std::time::Instant::now();
        assert!(bucket.wait_and_acquire(1, Duration::from_secs(2)).await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_wait_and_acquire_times_out() {
        // One token per minute: nothing refills within the timeout
        let bucket = TokenBucket::new(TokenBucketConfig::new(1, 1.0)).expect("valid bucket config");
        assert!(bucket.acquire(1));

        let started = std::time::Instant::now();
        assert!(!bucket.wait_and_acquire(1, Duration::from_millis(150)).await);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(150));
        assert!(waited < Duration::from_secs(1));
        assert_eq!(bucket.total_rejected(), 1);
    }

    #[tokio::test]
    async fn test_wait_and_acquire_with_unbounded_timeout() {
        let bucket = TokenBucket::new(TokenBucketConfig::new(60, 1.0)).expect("valid bucket config");

        assert!(bucket.wait_and_acquire(1, Duration::MAX).await);
        assert_eq!(bucket.total_acquired(), 1);
    }
}
