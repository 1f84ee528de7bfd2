//! # Hearth Domain
//!
//! Data types shared by every layer of the dispatch stack.
//!
//! This crate contains:
//! - Error types (`HearthError` for startup/config, `DispatchError` for call outcomes)
//! - The `ResilientResponse` envelope callers receive
//! - Configuration structures (`DispatchConfig`, `RateLimitConfig`, `BreakerSettings`)
//! - The service endpoint map and compiled-in per-service tables
//!
//! ## Architecture
//! - No dependencies on other Hearth crates
//! - Only external dependencies allowed
//! - Pure data, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
