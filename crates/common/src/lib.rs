//! Generic resilience primitives shared across Hearth crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: configuration errors
//! - `runtime`: token buckets, session limiters, circuit breakers and the
//!   clock abstraction (pulls in `tokio`, `parking_lot`, `dashmap`)
//! - `observability`: tracing of admission decisions (implied by `runtime`)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{ConfigError, ConfigResult};
#[cfg(feature = "runtime")]
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, CircuitState, Clock, MockClock,
    PerSessionLimiter, SessionLimiterStatus, SharedClock, SystemClock, TokenBucket,
    TokenBucketConfig, TokenBucketStatus,
};
