//! Aggregated health snapshot for dashboards

use std::collections::BTreeMap;

use hearth_common::resilience::CircuitBreakerStatus;
use hearth_domain::EndpointSource;
use serde::Serialize;

use crate::breakers::CircuitBreakerRegistry;
use crate::directory::ServiceDirectory;
use crate::rate_limits::{RateLimiterRegistry, RateLimiterStatus, RejectionStats};

/// Everything a health endpoint reports about the dispatch layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub circuit_breakers: BTreeMap<String, CircuitBreakerStatus>,
    pub rate_limiters: BTreeMap<String, RateLimiterStatus>,
    pub open_circuits: Vec<String>,
    pub rejection_stats: BTreeMap<String, RejectionStats>,
    pub directory_source: EndpointSource,
    pub known_services: usize,
}

impl HealthStatus {
    pub fn collect(
        breakers: &CircuitBreakerRegistry,
        limiters: &RateLimiterRegistry,
        directory: &ServiceDirectory,
    ) -> Self {
        let endpoints = directory.snapshot();
        Self {
            circuit_breakers: breakers.status(),
            rate_limiters: limiters.status(),
            open_circuits: breakers.open_circuits(),
            rejection_stats: limiters.rejection_stats(),
            directory_source: endpoints.source(),
            known_services: endpoints.len(),
        }
    }

    /// No breaker is open or half-open
    pub fn is_healthy(&self) -> bool {
        self.open_circuits.is_empty()
    }

    pub fn total_rejected(&self) -> u64 {
        self.rejection_stats.values().map(|stats| stats.rejected).sum()
    }
}

#[cfg(test)]
mod tests {
    use hearth_common::resilience::MockClock;
    use hearth_domain::{BreakerSettings, DispatchConfig, RateLimitConfig};

    use super::*;

    #[test]
    fn test_collects_all_sections() {
        let clock = MockClock::new();
        let mut config = DispatchConfig::default();
        config.breakers.insert("stocks".into(), BreakerSettings::new(1, 60, 1));
        config.rate_limits.insert("weather".into(), RateLimitConfig::new(1, 1.0, false));

        let breakers = CircuitBreakerRegistry::with_clock(&config, clock.shared()).unwrap();
        let limiters = RateLimiterRegistry::with_clock(&config, clock.shared()).unwrap();
        let directory = ServiceDirectory::from_config(&config);

        breakers.get("stocks").unwrap().record_failure();
        assert!(limiters.acquire_global("weather"));
        assert!(!limiters.acquire_global("weather"));

        let health = HealthStatus::collect(&breakers, &limiters, &directory);
        assert!(!health.is_healthy());
        assert_eq!(health.open_circuits, vec!["stocks".to_string()]);
        assert_eq!(health.total_rejected(), 1);
        assert_eq!(health.directory_source, EndpointSource::Fallback);
        assert_eq!(health.known_services, 20);

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["circuitBreakers"]["stocks"]["state"], "OPEN");
        assert_eq!(json["rateLimiters"]["weather"]["rejected"], 1);
        assert_eq!(json["rejectionStats"]["weather"]["acquired"], 1);
        assert_eq!(json["openCircuits"][0], "stocks");
        assert_eq!(json["directorySource"], "fallback");
    }
}
