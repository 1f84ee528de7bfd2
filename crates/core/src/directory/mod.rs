//! Service name resolution

pub mod ports;
pub mod service;

pub use ports::RegistrySource;
pub use service::{join_url, ServiceDirectory};
