//! # Hearth Infrastructure
//!
//! I/O side of the dispatch layer.
//!
//! This crate contains:
//! - The shared HTTP connection pool and the resilient client
//! - The HTTP implementation of the service registry port
//! - Configuration loading (file + environment)
//! - Tracing subscriber setup for binaries
//!
//! ## Architecture
//! - Implements ports defined in `hearth-core`
//! - Depends on `hearth-common`, `hearth-domain` and `hearth-core`
//! - Contains all network and filesystem access

pub mod config;
pub mod context;
pub mod discovery;
pub mod errors;
pub mod http;
pub mod observability;

// Re-export commonly used items
pub use context::DispatchContext;
pub use discovery::HttpRegistrySource;
pub use errors::InfraError;
pub use http::{ConnectionPool, ConnectionPoolBuilder, RequestOptions, ResilientClient};
pub use observability::{init_tracing, LogFormat};
