//! Dispatch configuration structures
//!
//! Everything here deserializes from TOML or JSON with every field
//! defaulted, so a config file only needs to name what it changes.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    default_breaker_for, default_rate_limit_for, DEFAULT_REGISTRY_TIMEOUT_MS,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SESSION_CLEANUP_SECS, DEFAULT_USER_AGENT,
    FALLBACK_SERVICE_URLS, REGISTRY_SERVICES_PATH,
};
use crate::errors::{HearthError, Result};
use crate::types::{EndpointSource, ServiceEndpointMap};

/// Rate budget for one backend service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst_multiplier: f64,
    /// Give every session its own bucket instead of sharing the global one
    pub per_session: bool,
}

impl RateLimitConfig {
    /// Budget applied to services with no table entry
    pub const DEFAULT: Self = Self::new(60, 1.5, true);

    pub const fn new(requests_per_minute: u32, burst_multiplier: f64, per_session: bool) -> Self {
        Self { requests_per_minute, burst_multiplier, per_session }
    }

    pub fn validate(&self) -> Result<()> {
        if self.requests_per_minute == 0 {
            return Err(HearthError::Config("requests_per_minute must be greater than 0".into()));
        }
        if !self.burst_multiplier.is_finite() || self.burst_multiplier <= 0.0 {
            return Err(HearthError::Config("burst_multiplier must be a positive number".into()));
        }
        if f64::from(self.requests_per_minute) * self.burst_multiplier < 1.0 {
            return Err(HearthError::Config(
                "requests_per_minute * burst_multiplier must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Circuit breaker settings for one backend service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
    pub half_open_max_calls: u32,
}

impl BreakerSettings {
    pub const DEFAULT: Self = Self::new(5, 60, 1);

    pub const fn new(failure_threshold: u32, cooldown_secs: u64, half_open_max_calls: u32) -> Self {
        Self { failure_threshold, cooldown_secs, half_open_max_calls }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(HearthError::Config("failure_threshold must be greater than 0".into()));
        }
        if self.cooldown_secs == 0 {
            return Err(HearthError::Config("cooldown_secs must be greater than 0".into()));
        }
        if self.half_open_max_calls == 0 {
            return Err(HearthError::Config("half_open_max_calls must be greater than 0".into()));
        }
        Ok(())
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Where and how to fetch the live service map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the admin/config service; `None` skips discovery
    pub url: Option<String>,
    pub path: String,
    pub timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: REGISTRY_SERVICES_PATH.to_string(),
            timeout_ms: DEFAULT_REGISTRY_TIMEOUT_MS,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Full registry endpoint URL, if a base URL is configured
    pub fn endpoint(&self) -> Option<String> {
        self.url.as_deref().map(|base| {
            let base = base.trim().trim_end_matches('/');
            if self.path.starts_with('/') {
                format!("{base}{}", self.path)
            } else {
                format!("{base}/{}", self.path)
            }
        })
    }
}

/// Shared HTTP connection pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub connect_timeout_ms: u64,
    pub idle_timeout_secs: u64,
    pub max_idle_per_host: usize,
    pub tcp_keepalive_secs: u64,
    pub user_agent: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            idle_timeout_secs: 90,
            max_idle_per_host: 32,
            tcp_keepalive_secs: 60,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Top-level configuration for the dispatch layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub registry: RegistryConfig,
    pub pool: PoolConfig,
    /// Timeout applied to calls that don't set their own
    pub request_timeout_ms: u64,
    pub session_cleanup_secs: u64,
    /// Budget for services with no table entry or override
    pub default_rate_limit: RateLimitConfig,
    /// Breaker settings for services with no table entry or override
    pub default_breaker: BreakerSettings,
    /// Per-service rate budgets, taking precedence over the compiled-in table
    pub rate_limits: HashMap<String, RateLimitConfig>,
    /// Per-service breaker settings, taking precedence over the compiled-in table
    pub breakers: HashMap<String, BreakerSettings>,
    /// Extra or replacement fallback endpoints
    pub services: HashMap<String, String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            pool: PoolConfig::default(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            session_cleanup_secs: DEFAULT_SESSION_CLEANUP_SECS,
            default_rate_limit: RateLimitConfig::DEFAULT,
            default_breaker: BreakerSettings::DEFAULT,
            rate_limits: HashMap::new(),
            breakers: HashMap::new(),
            services: HashMap::new(),
        }
    }
}

impl DispatchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_secs)
    }

    /// Rate budget for `service`: config override, then compiled-in table,
    /// then the configured default
    pub fn rate_limit_for(&self, service: &str) -> RateLimitConfig {
        self.rate_limits
            .get(service)
            .copied()
            .or_else(|| default_rate_limit_for(service))
            .unwrap_or(self.default_rate_limit)
    }

    /// Breaker settings for `service`, resolved like [`Self::rate_limit_for`]
    pub fn breaker_for(&self, service: &str) -> BreakerSettings {
        self.breakers
            .get(service)
            .copied()
            .or_else(|| default_breaker_for(service))
            .unwrap_or(self.default_breaker)
    }

    /// The compiled-in fallback map merged with configured extras
    pub fn fallback_endpoints(&self) -> ServiceEndpointMap {
        let compiled = FALLBACK_SERVICE_URLS.iter().map(|(name, url)| (*name, *url));
        let extras = self.services.iter().map(|(name, url)| (name.as_str(), url.as_str()));
        ServiceEndpointMap::from_pairs(compiled.chain(extras), EndpointSource::Fallback)
    }

    /// Reject configurations that cannot work; fail loudly at startup
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(HearthError::Config("request_timeout_ms must be greater than 0".into()));
        }
        if self.registry.timeout_ms == 0 {
            return Err(HearthError::Config("registry.timeout_ms must be greater than 0".into()));
        }
        if self.session_cleanup_secs == 0 {
            return Err(HearthError::Config("session_cleanup_secs must be greater than 0".into()));
        }
        self.default_rate_limit.validate()?;
        self.default_breaker.validate()?;

        for (service, config) in &self.rate_limits {
            config.validate().map_err(|e| {
                HearthError::Config(format!("rate_limits.{service}: {}", strip_prefix(&e)))
            })?;
        }
        for (service, settings) in &self.breakers {
            settings.validate().map_err(|e| {
                HearthError::Config(format!("breakers.{service}: {}", strip_prefix(&e)))
            })?;
        }
        for (service, url) in &self.services {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(HearthError::Config(format!(
                    "services.{service}: base url must be http(s), got {url}"
                )));
            }
        }
        Ok(())
    }
}

fn strip_prefix(error: &HearthError) -> String {
    match error {
        HearthError::Config(message) => message.clone(),
        other => other.to_string(),
    }
}
