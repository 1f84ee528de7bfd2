//! Circuit breaker for one remote destination
//!
//! | State | `can_execute` | on success | on failure |
//! |---|---|---|---|
//! | `Closed` | always | reset failure counter | count; open at threshold |
//! | `Open` | once cooldown elapsed (becomes `HalfOpen`, admits a trial) | - | - |
//! | `HalfOpen` | while fewer than `half_open_max_calls` trials are in flight | close | reopen |
//!
//! The breaker does not run operations itself. Callers ask [`CircuitBreaker::can_execute`]
//! before a call and report the outcome with [`CircuitBreaker::record_success`] or
//! [`CircuitBreaker::record_failure`]. An admitted call that never reaches the
//! destination hands its trial slot back with [`CircuitBreaker::release_probe`].
//! A trial that never reports at all (its caller was cancelled) is treated as
//! abandoned once a full cooldown has passed, so the breaker cannot wedge in
//! `HalfOpen`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::clock::{SharedClock, SystemClock};
use crate::error::{ConfigError, ConfigResult};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, admitting a bounded number of trial requests
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time to wait in `Open` before admitting a trial call
    pub cooldown: Duration,
    /// Maximum number of concurrent trial calls in `HalfOpen`
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, cooldown: Duration::from_secs(60), half_open_max_calls: 1 }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }

        if self.cooldown.is_zero() {
            return Err(ConfigError::invalid("cooldown must be greater than zero"));
        }

        if self.half_open_max_calls == 0 {
            return Err(ConfigError::invalid("half_open_max_calls must be greater than 0"));
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    pub fn half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.config.half_open_max_calls = max_calls;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Snapshot of a breaker for dashboards and health checks
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStatus {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Seconds until an `Open` breaker admits a trial; zero otherwise
    pub cooldown_remaining: f64,
    pub failure_threshold: u32,
    pub cooldown_seconds: f64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
}

#[derive(Debug)]
struct BreakerInner {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    /// Set exactly while the state is `Open` or `HalfOpen`
    opened_at: Option<Instant>,
    probes_in_flight: u32,
    probe_started_at: Option<Instant>,
}

impl BreakerInner {
    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.opened_at
            .map_or(true, |opened| now.saturating_duration_since(opened) >= self.config.cooldown)
    }

    fn probe_is_stale(&self, now: Instant) -> bool {
        self.probe_started_at
            .is_some_and(|started| now.saturating_duration_since(started) >= self.config.cooldown)
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.probes_in_flight = 0;
        self.probe_started_at = None;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.probes_in_flight = 0;
        self.probe_started_at = None;
    }

    fn admit_probe(&mut self, now: Instant) {
        self.probes_in_flight += 1;
        self.probe_started_at = Some(now);
    }
}

/// Failure-isolation state machine for one destination.
pub struct CircuitBreaker {
    name: String,
    inner: Mutex<BreakerInner>,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    rejected_calls: AtomicU64,
    clock: SharedClock,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .field("config", &inner.config)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker using the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock::shared())
    }

    /// Create a breaker with default settings
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::from_validated(name.into(), CircuitBreakerConfig::default(), SystemClock::shared())
    }

    /// Create a breaker with a custom clock
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: SharedClock,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(name.into(), config, clock))
    }

    fn from_validated(name: String, config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            name,
            inner: Mutex::new(BreakerInner {
                config,
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probes_in_flight: 0,
                probe_started_at: None,
            }),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the circuit breaker admits a call
    ///
    /// Returns `false` if the circuit is open and the cooldown hasn't
    /// elapsed, or if the half-open trial slots are taken. An `Open` breaker
    /// whose cooldown has elapsed moves to `HalfOpen` and admits the caller
    /// as its trial.
    pub fn can_execute(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let admitted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if inner.cooldown_elapsed(now) {
                    inner.state = CircuitState::HalfOpen;
                    inner.admit_probe(now);
                    info!(service = %self.name, "Circuit breaker half-open, admitting trial call");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probes_in_flight > 0 && inner.probe_is_stale(now) {
                    warn!(
                        service = %self.name,
                        abandoned = inner.probes_in_flight,
                        "Circuit breaker trial never reported, admitting a new one"
                    );
                    inner.probes_in_flight = 0;
                }
                if inner.probes_in_flight < inner.config.half_open_max_calls {
                    inner.admit_probe(now);
                    true
                } else {
                    false
                }
            }
        };

        if !admitted {
            self.rejected_calls.fetch_add(1, Ordering::Relaxed);
            debug!(service = %self.name, state = %inner.state, "Circuit breaker rejected call");
        }
        admitted
    }

    /// Non-mutating version of [`Self::can_execute`]
    ///
    /// Answers whether a call made now would be admitted, without moving
    /// the breaker to `HalfOpen` or claiming a trial slot.
    pub fn is_available(&self) -> bool {
        let now = self.clock.now();
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => inner.cooldown_elapsed(now),
            CircuitState::HalfOpen => {
                inner.probes_in_flight < inner.config.half_open_max_calls
                    || inner.probe_is_stale(now)
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.close();
                info!(service = %self.name, "Circuit breaker closed after successful trial");
            }
            CircuitState::Open => {
                // A call admitted before the breaker opened finished late.
                debug!(service = %self.name, "Ignoring success reported while open");
            }
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= inner.config.failure_threshold {
                    inner.open(now);
                    warn!(
                        service = %self.name,
                        failures = inner.consecutive_failures,
                        cooldown = ?inner.config.cooldown,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.open(now);
                warn!(service = %self.name, "Circuit breaker reopened after failed trial");
            }
            CircuitState::Open => {}
        }
    }

    /// Give back a trial slot claimed by a call that never reached the destination
    pub fn release_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.probes_in_flight > 0 {
            inner.probes_in_flight -= 1;
            if inner.probes_in_flight == 0 {
                inner.probe_started_at = None;
            }
        }
    }

    /// Reset the circuit breaker to closed state and zero its counters
    pub fn reset(&self) {
        self.inner.lock().close();
        self.total_successes.store(0, Ordering::Relaxed);
        self.total_failures.store(0, Ordering::Relaxed);
        self.rejected_calls.store(0, Ordering::Relaxed);
        info!(service = %self.name, "Circuit breaker manually reset to closed state");
    }

    /// Replace threshold/cooldown without disturbing the current state
    pub fn update_config(&self, config: CircuitBreakerConfig) -> ConfigResult<()> {
        config.validate()?;
        self.inner.lock().config = config;
        Ok(())
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.inner.lock().config
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// When the breaker last opened, while `Open` or `HalfOpen`
    pub fn opened_at(&self) -> Option<Instant> {
        self.inner.lock().opened_at
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let now = self.clock.now();
        let inner = self.inner.lock();
        let cooldown_remaining = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened)) => inner
                .config
                .cooldown
                .saturating_sub(now.saturating_duration_since(opened))
                .as_secs_f64(),
            _ => 0.0,
        };

        CircuitBreakerStatus {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            cooldown_remaining,
            failure_threshold: inner.config.failure_threshold,
            cooldown_seconds: inner.config.cooldown.as_secs_f64(),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the breaker state machine
    //!
    //! Every time-dependent case runs on a `MockClock` so cooldowns are
    //! crossed instantly.

    use super::super::clock::MockClock;
    use super::*;

    fn breaker(threshold: u32, cooldown_secs: u64) -> (CircuitBreaker, MockClock) {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(threshold)
            .cooldown(Duration::from_secs(cooldown_secs))
            .build()
            .expect("valid breaker config");
        let breaker =
            CircuitBreaker::with_clock("weather", config, clock.shared()).expect("breaker");
        (breaker, clock)
    }

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }

    #[test]
    fn test_circuit_breaker_config_validation() {
        assert!(CircuitBreakerConfig::builder().failure_threshold(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().cooldown(Duration::ZERO).build().is_err());
        assert!(CircuitBreakerConfig::builder().half_open_max_calls(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().build().is_ok());
    }

    #[test]
    fn test_closed_breaker_admits_calls() {
        let (breaker, _clock) = breaker(3, 30);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
        assert!(breaker.opened_at().is_none());
    }

    #[test]
    fn test_opens_on_threshold() {
        let (breaker, _clock) = breaker(3, 30);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.opened_at().is_some());
        assert!(!breaker.can_execute());
        assert_eq!(breaker.status().rejected_calls, 1);
    }

    #[test]
    fn test_success_resets_failure_counter() {
        let (breaker, _clock) = breaker(3, 30);

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_admits_single_trial() {
        let (breaker, clock) = breaker(1, 30);
        breaker.record_failure();

        clock.advance(Duration::from_secs(29));
        assert!(!breaker.can_execute());

        clock.advance(Duration::from_secs(1));
        assert!(breaker.can_execute(), "first call after cooldown is the trial");
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.can_execute(), "no second trial while the first is in flight");
        assert!(breaker.opened_at().is_some());
    }

    #[test]
    fn test_failed_trial_reopens_with_fresh_timestamp() {
        let (breaker, clock) = breaker(1, 30);
        breaker.record_failure();
        let first_opened = breaker.opened_at().expect("opened");

        clock.advance(Duration::from_secs(30));
        assert!(breaker.can_execute());
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        let reopened = breaker.opened_at().expect("reopened");
        assert!(reopened > first_opened);
        assert!(!breaker.can_execute());
        assert!((breaker.status().cooldown_remaining - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_successful_trial_closes() {
        let (breaker, clock) = breaker(2, 30);
        breaker.record_failure();
        breaker.record_failure();

        clock.advance(Duration::from_secs(31));
        assert!(breaker.can_execute());
        breaker.record_success();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
        assert!(breaker.opened_at().is_none());
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_release_probe_frees_trial_slot() {
        let (breaker, clock) = breaker(1, 10);
        breaker.record_failure();
        clock.advance(Duration::from_secs(10));

        assert!(breaker.can_execute());
        assert!(!breaker.can_execute());
        breaker.release_probe();
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_abandoned_trial_expires_after_cooldown() {
        let (breaker, clock) = breaker(1, 10);
        breaker.record_failure();
        clock.advance(Duration::from_secs(10));
        assert!(breaker.can_execute());

        clock.advance(Duration::from_secs(5));
        assert!(!breaker.can_execute());
        assert!(!breaker.is_available());

        clock.advance(Duration::from_secs(5));
        assert!(breaker.is_available());
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_bounded_concurrent_trials() {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .cooldown(Duration::from_secs(5))
            .half_open_max_calls(2)
            .build()
            .expect("valid breaker config");
        let breaker = CircuitBreaker::with_clock("news", config, clock.shared()).expect("breaker");

        breaker.record_failure();
        clock.advance(Duration::from_secs(5));
        assert!(breaker.can_execute());
        assert!(breaker.can_execute());
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_is_available_does_not_transition() {
        let (breaker, clock) = breaker(1, 10);
        breaker.record_failure();
        clock.advance(Duration::from_secs(10));

        assert!(breaker.is_available());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_reset_forces_closed() {
        let (breaker, _clock) = breaker(1, 60);
        breaker.record_failure();
        assert!(!breaker.can_execute());

        breaker.reset();
        let status = breaker.status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.rejected_calls, 0);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_status_reports_cooldown_remaining() {
        let (breaker, clock) = breaker(1, 60);
        assert!(breaker.status().cooldown_remaining.abs() < f64::EPSILON);

        breaker.record_failure();
        clock.advance(Duration::from_secs(15));
        let status = breaker.status();
        assert_eq!(status.state, CircuitState::Open);
        assert!((status.cooldown_remaining - 45.0).abs() < 1e-6);
        assert_eq!(status.total_failures, 1);
    }
}
