//! Admission-control primitives for outbound calls
//!
//! This module provides the **generic, reusable** building blocks the
//! dispatch layer composes per backend service:
//! - **Token Bucket**: bounded-burst rate limiting with continuous refill
//! - **Per-Session Limiter**: one token bucket per session, evicted when idle
//! - **Circuit Breaker**: CLOSED / OPEN / HALF_OPEN failure isolation with a
//!   bounded trial in half-open
//!
//! None of these types know about services, URLs or HTTP. Registries in
//! `hearth-core` own one instance per service and decide which config each
//! gets. Every primitive keeps its own lock, so traffic to unrelated
//! services or sessions never serializes on a shared mutex.
//!
//! All time reads go through [`Clock`]; tests inject a [`MockClock`] to make
//! refill and cooldown behaviour deterministic.

pub mod circuit_breaker;
pub mod clock;
pub mod session_limiter;
pub mod token_bucket;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerStatus,
    CircuitState,
};
pub use clock::{Clock, MockClock, SharedClock, SystemClock};
// Re-export rate limiting types
pub use session_limiter::{PerSessionLimiter, SessionLimiterStatus, DEFAULT_CLEANUP_INTERVAL};
pub use token_bucket::{
    TokenBucket, TokenBucketConfig, TokenBucketConfigBuilder, TokenBucketStatus,
    MAX_POLL_INTERVAL, MIN_POLL_INTERVAL,
};
