//! HTTP plumbing: the shared connection pool and the resilient client

pub mod client;
pub mod pool;

pub use client::{RequestOptions, ResilientClient};
pub use pool::{ConnectionPool, ConnectionPoolBuilder};
