//! Rate limiting per backend service and session

pub mod registry;

pub use registry::{RateLimiterRegistry, RateLimiterStatus, RejectionStats, ServiceLimiter};
