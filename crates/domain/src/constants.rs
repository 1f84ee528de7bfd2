//! Compiled-in dispatch tables
//!
//! Adding a backend service means adding rows here (or in the config file),
//! never new branching code. Services missing from a table fall back to the
//! generic defaults in [`crate::config`].

use crate::config::{BreakerSettings, RateLimitConfig};

/// Path of the service registry endpoint, relative to the registry base URL
pub const REGISTRY_SERVICES_PATH: &str = "/internal/config/rag-services";

/// Default timeout for the one-shot registry load
pub const DEFAULT_REGISTRY_TIMEOUT_MS: u64 = 5_000;

/// Default per-request timeout when the caller does not override it
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Idle time after which a session's bucket is evicted
pub const DEFAULT_SESSION_CLEANUP_SECS: u64 = 300;

pub const DEFAULT_USER_AGENT: &str = concat!("hearth-dispatch/", env!("CARGO_PKG_VERSION"));

/// Static endpoint map used when the registry is unreachable or empty
pub const FALLBACK_SERVICE_URLS: &[(&str, &str)] = &[
    ("weather", "http://localhost:8010"),
    ("airports", "http://localhost:8011"),
    ("stocks", "http://localhost:8012"),
    ("flights", "http://localhost:8013"),
    ("events", "http://localhost:8014"),
    ("streaming", "http://localhost:8015"),
    ("news", "http://localhost:8016"),
    ("recipes", "http://localhost:8017"),
    ("dining", "http://localhost:8018"),
    ("sports", "http://localhost:8019"),
    ("websearch", "http://localhost:8020"),
    ("directions", "http://localhost:8021"),
    ("transit", "http://localhost:8022"),
    ("media", "http://localhost:8023"),
    ("community_events", "http://localhost:8024"),
    ("price_compare", "http://localhost:8025"),
    ("music", "http://localhost:8026"),
    ("astronomy", "http://localhost:8027"),
    ("amtrak", "http://localhost:8028"),
    ("site_scraper", "http://localhost:8029"),
];

/// Per-service rate budgets
///
/// Cheap lookups against local or free upstreams get generous budgets; paid
/// APIs (web search, flights, price comparison) get tight ones.
pub const SERVICE_RATE_LIMITS: &[(&str, RateLimitConfig)] = &[
    ("weather", RateLimitConfig::new(120, 2.0, true)),
    ("airports", RateLimitConfig::new(60, 1.5, true)),
    ("stocks", RateLimitConfig::new(30, 1.5, true)),
    ("flights", RateLimitConfig::new(20, 1.5, true)),
    ("events", RateLimitConfig::new(60, 1.5, true)),
    ("streaming", RateLimitConfig::new(60, 1.5, true)),
    ("news", RateLimitConfig::new(60, 2.0, true)),
    ("recipes", RateLimitConfig::new(60, 1.5, true)),
    ("dining", RateLimitConfig::new(30, 1.5, true)),
    ("sports", RateLimitConfig::new(90, 2.0, true)),
    ("websearch", RateLimitConfig::new(20, 1.5, true)),
    ("directions", RateLimitConfig::new(60, 1.5, true)),
    ("transit", RateLimitConfig::new(120, 2.0, true)),
    ("media", RateLimitConfig::new(60, 1.5, true)),
    ("price_compare", RateLimitConfig::new(15, 1.0, true)),
    ("site_scraper", RateLimitConfig::new(10, 1.0, false)),
];

/// Per-service breaker settings that differ from the default
pub const SERVICE_BREAKER_SETTINGS: &[(&str, BreakerSettings)] = &[
    ("websearch", BreakerSettings::new(3, 120, 1)),
    ("flights", BreakerSettings::new(3, 120, 1)),
    ("price_compare", BreakerSettings::new(3, 180, 1)),
    ("site_scraper", BreakerSettings::new(3, 300, 1)),
    ("weather", BreakerSettings::new(5, 30, 1)),
    ("transit", BreakerSettings::new(5, 30, 1)),
];

/// Look up a compiled-in rate budget
pub fn default_rate_limit_for(service: &str) -> Option<RateLimitConfig> {
    SERVICE_RATE_LIMITS.iter().find(|(name, _)| *name == service).map(|(_, config)| *config)
}

/// Look up compiled-in breaker settings
pub fn default_breaker_for(service: &str) -> Option<BreakerSettings> {
    SERVICE_BREAKER_SETTINGS.iter().find(|(name, _)| *name == service).map(|(_, config)| *config)
}
