//! Per-service rate limiter ownership

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use hearth_common::resilience::{
    PerSessionLimiter, SessionLimiterStatus, SharedClock, SystemClock, TokenBucket,
    TokenBucketConfig, TokenBucketStatus,
};
use hearth_domain::{DispatchConfig, RateLimitConfig, Result};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::errors::config_error;

/// Admission counters for one service, across both limiter paths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionStats {
    pub acquired: u64,
    pub rejected: u64,
}

/// Health snapshot of one service's limiters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStatus {
    pub tokens_available: f64,
    pub capacity: f64,
    pub requests_per_minute: u32,
    pub per_session: bool,
    pub acquired: u64,
    pub rejected: u64,
    pub global: TokenBucketStatus,
    pub sessions: SessionLimiterStatus,
}

/// Global bucket plus session buckets for one backend service
pub struct ServiceLimiter {
    service: String,
    settings: RwLock<RateLimitConfig>,
    global: TokenBucket,
    sessions: PerSessionLimiter,
    acquired: AtomicU64,
    rejected: AtomicU64,
}

impl ServiceLimiter {
    fn new(
        service: &str,
        settings: RateLimitConfig,
        cleanup_interval: Duration,
        clock: SharedClock,
    ) -> Result<Self> {
        let bucket_config =
            TokenBucketConfig::new(settings.requests_per_minute, settings.burst_multiplier);
        let global =
            TokenBucket::with_clock(bucket_config, Arc::clone(&clock)).map_err(config_error)?;
        let sessions = PerSessionLimiter::with_clock(bucket_config, cleanup_interval, clock)
            .map_err(config_error)?;

        Ok(Self {
            service: service.to_string(),
            settings: RwLock::new(settings),
            global,
            sessions,
            acquired: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn settings(&self) -> RateLimitConfig {
        *self.settings.read()
    }

    pub fn global(&self) -> &TokenBucket {
        &self.global
    }

    pub fn sessions(&self) -> &PerSessionLimiter {
        &self.sessions
    }

    /// Whether a call with this session id is charged to a session bucket
    pub fn uses_session_bucket(&self, session_id: Option<&str>) -> bool {
        session_id.is_some() && self.settings.read().per_session
    }

    fn record(&self, acquired: bool, session_id: Option<&str>) -> bool {
        if acquired {
            self.acquired.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(service = %self.service, session_id, "Rate limit exceeded");
        }
        acquired
    }

    /// Take one token without waiting
    pub fn acquire(&self, session_id: Option<&str>) -> bool {
        let acquired = match session_id {
            Some(id) if self.uses_session_bucket(session_id) => self.sessions.acquire(id, 1),
            _ => self.global.acquire(1),
        };
        self.record(acquired, session_id)
    }

    /// Take one token, waiting up to `timeout`
    pub async fn wait_and_acquire(&self, session_id: Option<&str>, timeout: Duration) -> bool {
        let acquired = match session_id {
            Some(id) if self.uses_session_bucket(session_id) => {
                self.sessions.wait_and_acquire(id, 1, timeout).await
            }
            _ => self.global.wait_and_acquire(1, timeout).await,
        };
        self.record(acquired, session_id)
    }

    fn update_rate(&self, requests_per_minute: u32) -> Result<()> {
        let mut settings = self.settings.write();
        let updated = RateLimitConfig { requests_per_minute, ..*settings };
        updated.validate()?;
        self.global.update_config(requests_per_minute).map_err(config_error)?;
        self.sessions.update_config(requests_per_minute).map_err(config_error)?;
        *settings = updated;
        Ok(())
    }

    fn reset(&self) {
        self.global.reset();
        self.sessions.reset();
        self.acquired.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
    }

    pub fn rejection_stats(&self) -> RejectionStats {
        RejectionStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn status(&self) -> RateLimiterStatus {
        let settings = self.settings();
        let global = self.global.status();
        let stats = self.rejection_stats();
        RateLimiterStatus {
            tokens_available: global.tokens_available,
            capacity: global.capacity,
            requests_per_minute: settings.requests_per_minute,
            per_session: settings.per_session,
            acquired: stats.acquired,
            rejected: stats.rejected,
            global,
            sessions: self.sessions.status(),
        }
    }
}

/// Owns one [`ServiceLimiter`] per backend service
///
/// Limiters are created on first use. The config for a service resolves as:
/// runtime update, then configured override, then the compiled-in table,
/// then the configured default.
pub struct RateLimiterRegistry {
    config: DispatchConfig,
    cleanup_interval: Duration,
    limiters: DashMap<String, Arc<ServiceLimiter>>,
    clock: SharedClock,
}

impl RateLimiterRegistry {
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    pub fn with_clock(config: &DispatchConfig, clock: SharedClock) -> Result<Self> {
        config.default_rate_limit.validate()?;
        for limit in config.rate_limits.values() {
            limit.validate()?;
        }
        if config.session_cleanup_secs == 0 {
            return Err(hearth_domain::HearthError::Config(
                "session_cleanup_secs must be greater than 0".into(),
            ));
        }

        Ok(Self {
            config: config.clone(),
            cleanup_interval: config.session_cleanup_interval(),
            limiters: DashMap::new(),
            clock,
        })
    }

    /// Effective config for `service`
    pub fn config_for(&self, service: &str) -> RateLimitConfig {
        if let Some(limiter) = self.limiters.get(service) {
            return limiter.settings();
        }
        self.resolve(service)
    }

    fn resolve(&self, service: &str) -> RateLimitConfig {
        self.config.rate_limit_for(service)
    }

    /// The limiter for `service`, created on first use
    pub fn limiter(&self, service: &str) -> Result<Arc<ServiceLimiter>> {
        if let Some(existing) = self.limiters.get(service) {
            return Ok(Arc::clone(existing.value()));
        }

        let settings = self.resolve(service);
        let entry = self.limiters.entry(service.to_string()).or_try_insert_with(|| {
            debug!(
                service,
                requests_per_minute = settings.requests_per_minute,
                burst_multiplier = settings.burst_multiplier,
                per_session = settings.per_session,
                "Creating rate limiter"
            );
            ServiceLimiter::new(service, settings, self.cleanup_interval, Arc::clone(&self.clock))
                .map(Arc::new)
        })?;
        Ok(Arc::clone(entry.value()))
    }

    /// Take a token from the service's global bucket
    pub fn acquire_global(&self, service: &str) -> bool {
        self.acquire(service, None)
    }

    /// Take a token from the session's bucket, or the global one when the
    /// service does not limit per session
    pub fn acquire_for_session(&self, service: &str, session_id: &str) -> bool {
        self.acquire(service, Some(session_id))
    }

    /// Non-blocking admission; fails closed if the limiter cannot be built
    pub fn acquire(&self, service: &str, session_id: Option<&str>) -> bool {
        match self.limiter(service) {
            Ok(limiter) => limiter.acquire(session_id),
            Err(err) => {
                error!(service, error = %err, "Rate limiter unavailable, denying request");
                false
            }
        }
    }

    /// Admission that waits up to `timeout` for a token
    pub async fn wait_and_acquire(
        &self,
        service: &str,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> bool {
        match self.limiter(service) {
            Ok(limiter) => limiter.wait_and_acquire(session_id, timeout).await,
            Err(err) => {
                error!(service, error = %err, "Rate limiter unavailable, denying request");
                false
            }
        }
    }

    /// Change a service's rate, keeping its burst multiplier and session mode
    ///
    /// Current tokens are clamped to the new capacity, never refilled.
    pub fn update_config(&self, service: &str, requests_per_minute: u32) -> Result<()> {
        let limiter = self.limiter(service)?;
        limiter.update_rate(requests_per_minute)?;
        info!(service, requests_per_minute, "Updated rate limit");
        Ok(())
    }

    /// Refill the service's buckets and zero its counters; returns whether
    /// the service had a limiter
    pub fn reset_service(&self, service: &str) -> bool {
        match self.limiters.get(service) {
            Some(limiter) => {
                limiter.reset();
                info!(service, "Rate limiter reset");
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for limiter in self.limiters.iter() {
            limiter.reset();
        }
        info!(services = self.limiters.len(), "All rate limiters reset");
    }

    /// Services that have a limiter, sorted
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.limiters.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn status(&self) -> BTreeMap<String, RateLimiterStatus> {
        self.limiters.iter().map(|e| (e.key().clone(), e.value().status())).collect()
    }

    pub fn rejection_stats(&self) -> BTreeMap<String, RejectionStats> {
        self.limiters.iter().map(|e| (e.key().clone(), e.value().rejection_stats())).collect()
    }
}

impl std::fmt::Debug for RateLimiterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterRegistry")
            .field("services", &self.limiters.len())
            .field("default_config", &self.config.default_rate_limit)
            .field("cleanup_interval", &self.cleanup_interval)
            .finish()
    }
}
