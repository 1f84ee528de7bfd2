//! Per-session token buckets
//!
//! Wraps [`TokenBucket`] per session identifier so one chatty session cannot
//! starve the others calling the same backend. Buckets are created on first
//! use and evicted once idle for longer than the cleanup interval. Eviction
//! is opportunistic: the first call after an interval has passed sweeps the
//! map, there is no background timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info};

use super::clock::{SharedClock, SystemClock};
use super::token_bucket::{TokenBucket, TokenBucketConfig};
use crate::error::{ConfigError, ConfigResult};

/// Default idle time after which a session bucket is dropped.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct SessionEntry {
    bucket: Arc<TokenBucket>,
    last_access: Instant,
}

/// Aggregate view over every session bucket of one limiter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLimiterStatus {
    pub active_sessions: usize,
    pub requests_per_minute: u32,
    pub capacity_per_session: f64,
    pub total_acquired: u64,
    pub total_rejected: u64,
}

/// One token bucket per session identifier.
pub struct PerSessionLimiter {
    config: RwLock<TokenBucketConfig>,
    sessions: DashMap<String, SessionEntry>,
    cleanup_interval: Duration,
    last_sweep: Mutex<Instant>,
    total_acquired: AtomicU64,
    total_rejected: AtomicU64,
    clock: SharedClock,
}

impl std::fmt::Debug for PerSessionLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerSessionLimiter")
            .field("config", &*self.config.read())
            .field("sessions", &self.sessions.len())
            .field("cleanup_interval", &self.cleanup_interval)
            .finish()
    }
}

impl PerSessionLimiter {
    /// Create a limiter using the system clock.
    pub fn new(config: TokenBucketConfig, cleanup_interval: Duration) -> ConfigResult<Self> {
        Self::with_clock(config, cleanup_interval, SystemClock::shared())
    }

    pub fn with_clock(
        config: TokenBucketConfig,
        cleanup_interval: Duration,
        clock: SharedClock,
    ) -> ConfigResult<Self> {
        config.validate()?;
        if cleanup_interval.is_zero() {
            return Err(ConfigError::invalid("cleanup_interval must be greater than zero"));
        }

        Ok(Self {
            config: RwLock::new(config),
            sessions: DashMap::new(),
            cleanup_interval,
            last_sweep: Mutex::new(clock.now()),
            total_acquired: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            clock,
        })
    }

    /// Bucket for `session_id`, created on demand; refreshes `last_access`.
    fn touch(&self, session_id: &str) -> Arc<TokenBucket> {
        let now = self.clock.now();
        self.maybe_sweep(now);

        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.last_access = now;
            return Arc::clone(&entry.bucket);
        }

        let config = *self.config.read();
        let mut entry = self.sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session_id, "Creating session rate limiter");
            SessionEntry {
                bucket: Arc::new(TokenBucket::from_validated(config, Arc::clone(&self.clock))),
                last_access: now,
            }
        });
        entry.last_access = now;
        Arc::clone(&entry.bucket)
    }

    fn record(&self, acquired: bool, tokens: u32) -> bool {
        if acquired {
            self.total_acquired.fetch_add(u64::from(tokens), Ordering::Relaxed);
        } else {
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
        }
        acquired
    }

    /// Take `tokens` from the session's bucket without waiting.
    pub fn acquire(&self, session_id: &str, tokens: u32) -> bool {
        let bucket = self.touch(session_id);
        self.record(bucket.acquire(tokens), tokens)
    }

    /// Take `tokens` from the session's bucket, waiting up to `timeout`.
    pub async fn wait_and_acquire(&self, session_id: &str, tokens: u32, timeout: Duration) -> bool {
        let bucket = self.touch(session_id);
        let acquired = bucket.wait_and_acquire(tokens, timeout).await;
        self.record(acquired, tokens)
    }

    fn maybe_sweep(&self, now: Instant) {
        // A concurrent caller already sweeping is good enough.
        let Some(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last_sweep) < self.cleanup_interval {
            return;
        }
        *last_sweep = now;
        drop(last_sweep);
        self.evict_idle(now);
    }

    /// Drop every session idle for longer than the cleanup interval.
    ///
    /// Returns the number of evicted sessions.
    pub fn cleanup_idle(&self) -> usize {
        let now = self.clock.now();
        *self.last_sweep.lock() = now;
        self.evict_idle(now)
    }

    fn evict_idle(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| {
            now.saturating_duration_since(entry.last_access) <= self.cleanup_interval
        });
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, remaining = self.sessions.len(), "Evicted idle session limiters");
        }
        removed
    }

    /// Apply a new rate to existing and future session buckets.
    pub fn update_config(&self, requests_per_minute: u32) -> ConfigResult<()> {
        let mut config = self.config.write();
        let updated = TokenBucketConfig { requests_per_minute, ..*config };
        updated.validate()?;
        *config = updated;
        drop(config);

        for entry in self.sessions.iter() {
            entry.bucket.update(updated)?;
        }
        info!(requests_per_minute, sessions = self.sessions.len(), "Updated session rate limit");
        Ok(())
    }

    /// Forget one session's bucket.
    pub fn remove_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Drop every session bucket and zero the counters.
    pub fn reset(&self) {
        self.sessions.clear();
        self.total_acquired.store(0, Ordering::Relaxed);
        self.total_rejected.store(0, Ordering::Relaxed);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    pub fn config(&self) -> TokenBucketConfig {
        *self.config.read()
    }

    pub fn status(&self) -> SessionLimiterStatus {
        let config = self.config();
        SessionLimiterStatus {
            active_sessions: self.sessions.len(),
            requests_per_minute: config.requests_per_minute,
            capacity_per_session: config.capacity(),
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::clock::MockClock;
    use super::*;

    fn limiter(rpm: u32, cleanup: Duration) -> (PerSessionLimiter, MockClock) {
        let clock = MockClock::new();
        let limiter =
            PerSessionLimiter::with_clock(TokenBucketConfig::new(rpm, 1.0), cleanup, clock.shared())
                .expect("valid limiter config");
        (limiter, clock)
    }

    #[test]
    fn test_sessions_are_isolated() {
        let (limiter, _clock) = limiter(3, DEFAULT_CLEANUP_INTERVAL);

        for _ in 0..3 {
            assert!(limiter.acquire("session-a", 1));
        }
        assert!(!limiter.acquire("session-a", 1));

        assert!(limiter.acquire("session-b", 1), "session B keeps its own budget");
        assert_eq!(limiter.session_count(), 2);

        let status = limiter.status();
        assert_eq!(status.total_acquired, 4);
        assert_eq!(status.total_rejected, 1);
    }

    #[test]
    fn test_idle_sessions_are_evicted_on_next_call() {
        let (limiter, clock) = limiter(10, Duration::from_secs(60));

        assert!(limiter.acquire("idle", 1));
        clock.advance(Duration::from_secs(30));
        assert!(limiter.acquire("active", 1));

        clock.advance(Duration::from_secs(31));
        assert!(limiter.acquire("active", 1));

        assert!(!limiter.has_session("idle"));
        assert!(limiter.has_session("active"));
        assert_eq!(limiter.session_count(), 1);
    }

    #[test]
    fn test_sweep_runs_at_most_once_per_interval() {
        let (limiter, clock) = limiter(10, Duration::from_secs(60));

        assert!(limiter.acquire("first", 1));
        clock.advance(Duration::from_secs(61));
        // Sweep fires here and removes "first"
        assert!(limiter.acquire("second", 1));
        assert_eq!(limiter.session_count(), 1);

        // "second" goes idle, but the next sweep is not due until 60s later
        clock.advance(Duration::from_secs(59));
        assert!(limiter.acquire("third", 1));
        assert!(limiter.has_session("second"));
    }

    #[test]
    fn test_cleanup_idle_forces_sweep() {
        let (limiter, clock) = limiter(10, Duration::from_secs(60));
        assert!(limiter.acquire("a", 1));
        assert!(limiter.acquire("b", 1));

        clock.advance(Duration::from_secs(120));
        assert_eq!(limiter.cleanup_idle(), 2);
        assert_eq!(limiter.session_count(), 0);
    }

    #[test]
    fn test_update_config_applies_to_existing_sessions() {
        let (limiter, _clock) = limiter(10, DEFAULT_CLEANUP_INTERVAL);
        assert!(limiter.acquire("s", 1));

        limiter.update_config(2).expect("valid rate");
        // 9 tokens left are clamped to the new capacity of 2
        assert!(limiter.acquire("s", 1));
        assert!(limiter.acquire("s", 1));
        assert!(!limiter.acquire("s", 1));

        assert!(limiter.acquire("new", 2));
        assert!(!limiter.acquire("new", 1));
        assert!(limiter.update_config(0).is_err());
    }

    #[test]
    fn test_reset_clears_sessions() {
        let (limiter, _clock) = limiter(1, DEFAULT_CLEANUP_INTERVAL);
        assert!(limiter.acquire("s", 1));
        assert!(!limiter.acquire("s", 1));

        limiter.reset();
        assert_eq!(limiter.session_count(), 0);
        assert!(limiter.acquire("s", 1));
        assert_eq!(limiter.status().total_rejected, 0);
    }

    #[test]
    fn test_remove_session_gives_fresh_budget() {
        let (limiter, _clock) = limiter(1, DEFAULT_CLEANUP_INTERVAL);
        assert!(limiter.acquire("kitchen", 1));
        assert!(limiter.acquire("bedroom", 1));
        assert!(!limiter.acquire("kitchen", 1));

        assert!(limiter.remove_session("kitchen"));
        assert!(!limiter.remove_session("kitchen"));
        assert!(!limiter.has_session("kitchen"));
        assert!(limiter.has_session("bedroom"));

        assert!(limiter.acquire("kitchen", 1));
        assert!(!limiter.acquire("bedroom", 1));
    }

    #[test]
    fn test_zero_cleanup_interval_rejected() {
        let result = PerSessionLimiter::new(TokenBucketConfig::default(), Duration::ZERO);
        assert!(result.is_err());
    }
}
