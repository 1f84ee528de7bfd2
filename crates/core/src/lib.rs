//! # Hearth Core
//!
//! In-process state owners for the dispatch layer - no network I/O.
//!
//! This crate contains:
//! - `RateLimiterRegistry`: one global bucket and one per-session limiter per service
//! - `CircuitBreakerRegistry`: one breaker per service
//! - `ServiceDirectory`: the service name to base URL map, swapped atomically
//! - `HealthStatus`: the aggregated dashboard snapshot
//!
//! ## Architecture Principles
//! - Depends on `hearth-common` primitives and `hearth-domain` types
//! - No HTTP code; discovery goes through the `RegistrySource` port
//! - Per-service state is created lazily from data-driven tables

pub mod breakers;
pub mod directory;
pub mod errors;
pub mod health;
pub mod rate_limits;

pub use breakers::CircuitBreakerRegistry;
pub use directory::{join_url, RegistrySource, ServiceDirectory};
pub use errors::config_error;
pub use health::HealthStatus;
pub use rate_limits::{RateLimiterRegistry, RateLimiterStatus, RejectionStats, ServiceLimiter};
