//! Per-service circuit breaker ownership

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use hearth_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, CircuitState, SharedClock,
    SystemClock,
};
use hearth_domain::{BreakerSettings, DispatchConfig, Result};
use tracing::{debug, info};

use crate::errors::config_error;

fn breaker_config(settings: BreakerSettings) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: settings.failure_threshold,
        cooldown: settings.cooldown(),
        half_open_max_calls: settings.half_open_max_calls,
    }
}

/// Owns one [`CircuitBreaker`] per backend service
pub struct CircuitBreakerRegistry {
    config: DispatchConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    clock: SharedClock,
}

impl CircuitBreakerRegistry {
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    pub fn with_clock(config: &DispatchConfig, clock: SharedClock) -> Result<Self> {
        config.default_breaker.validate()?;
        for settings in config.breakers.values() {
            settings.validate()?;
        }
        Ok(Self {
            config: config.clone(),
            breakers: DashMap::new(),
            clock,
        })
    }

    /// Settings a new breaker for `service` would start with
    pub fn settings_for(&self, service: &str) -> BreakerSettings {
        self.config.breaker_for(service)
    }

    /// The breaker for `service`, created on first use
    pub fn get(&self, service: &str) -> Result<Arc<CircuitBreaker>> {
        if let Some(existing) = self.breakers.get(service) {
            return Ok(Arc::clone(existing.value()));
        }

        let config = breaker_config(self.settings_for(service));
        let entry = self.breakers.entry(service.to_string()).or_try_insert_with(|| {
            debug!(
                service,
                failure_threshold = config.failure_threshold,
                cooldown_secs = config.cooldown.as_secs(),
                "Creating circuit breaker"
            );
            CircuitBreaker::with_clock(service, config, Arc::clone(&self.clock))
                .map(Arc::new)
                .map_err(config_error)
        })?;
        Ok(Arc::clone(entry.value()))
    }

    /// Non-mutating admission check; services never called are available
    pub fn is_available(&self, service: &str) -> bool {
        self.breakers.get(service).map_or(true, |breaker| breaker.is_available())
    }

    /// Replace a service's breaker settings without touching its state
    pub fn update_settings(&self, service: &str, settings: BreakerSettings) -> Result<()> {
        settings.validate()?;
        self.get(service)?.update_config(breaker_config(settings)).map_err(config_error)?;
        info!(
            service,
            failure_threshold = settings.failure_threshold,
            cooldown_secs = settings.cooldown_secs,
            "Updated circuit breaker settings"
        );
        Ok(())
    }

    /// Force a service's breaker closed; returns whether it existed
    pub fn reset_service(&self, service: &str) -> bool {
        match self.breakers.get(service) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.iter() {
            breaker.reset();
        }
        info!(services = self.breakers.len(), "All circuit breakers reset");
    }

    /// Services whose breaker is not closed, sorted
    pub fn open_circuits(&self) -> Vec<String> {
        let mut open: Vec<String> = self
            .breakers
            .iter()
            .filter(|entry| entry.value().state() != CircuitState::Closed)
            .map(|entry| entry.key().clone())
            .collect();
        open.sort();
        open
    }

    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn status(&self) -> BTreeMap<String, CircuitBreakerStatus> {
        self.breakers.iter().map(|e| (e.key().clone(), e.value().status())).collect()
    }
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("services", &self.breakers.len())
            .field("default_settings", &self.config.default_breaker)
            .finish()
    }
}
