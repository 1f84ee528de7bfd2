//! Error types used throughout the dispatch stack

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Hearth construction and configuration
///
/// Only startup and operator actions return this. Outbound calls never do:
/// their failures travel inside [`crate::ResilientResponse`] as a
/// [`DispatchError`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum HearthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Hearth operations
pub type Result<T> = std::result::Result<T, HearthError>;

/// Why an outbound call did not produce usable data
///
/// Admission denials (`CircuitOpen`, `RateLimited`) and configuration
/// mistakes (`UnknownService`) never reach the network. `ConnectFailed` and
/// `Timeout` are transport failures and count against the destination's
/// circuit breaker; `BadStatus` and `ParseError` mean the destination was
/// reached and do not.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchError {
    #[error("circuit open")]
    CircuitOpen,

    #[error("rate limited")]
    RateLimited,

    #[error("unknown service: {service}")]
    UnknownService { service: String },

    #[error("connect failed: {message}")]
    ConnectFailed { message: String },

    #[error("timeout after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("bad status: HTTP {code}")]
    BadStatus { code: u16 },

    #[error("parse error: {message}")]
    ParseError { message: String },
}

impl DispatchError {
    /// Stable machine-readable tag, matching the serialized `kind`
    pub fn code(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::RateLimited => "rate_limited",
            Self::UnknownService { .. } => "unknown_service",
            Self::ConnectFailed { .. } => "connect_failed",
            Self::Timeout { .. } => "timeout",
            Self::BadStatus { .. } => "bad_status",
            Self::ParseError { .. } => "parse_error",
        }
    }

    /// Transport failures are the only outcomes that trip a breaker
    pub fn counts_as_breaker_failure(&self) -> bool {
        matches!(self, Self::ConnectFailed { .. } | Self::Timeout { .. })
    }

    /// The destination answered (the problem is the payload, not reachability)
    pub fn destination_reached(&self) -> bool {
        matches!(self, Self::BadStatus { .. } | Self::ParseError { .. })
    }
}
