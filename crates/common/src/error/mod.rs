//! Common error types shared by the resilience primitives
//!
//! Primitives in this crate only fail at construction or reconfiguration
//! time. Admission decisions are plain `bool`s, never errors, so the only
//! error surface here is configuration validation.

use thiserror::Error;

/// Simple configuration error for validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    /// Build an [`ConfigError::Invalid`] from any message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("capacity must be greater than 0");
        assert_eq!(err.to_string(), "Invalid configuration: capacity must be greater than 0");
    }
}
