//! Circuit breaking per backend service

pub mod registry;

pub use registry::CircuitBreakerRegistry;
