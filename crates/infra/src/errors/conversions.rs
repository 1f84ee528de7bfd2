//! Conversions from external infrastructure errors into domain errors.

use std::error::Error as StdError;
use std::time::Duration;

use hearth_domain::{DispatchError, HearthError};
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub HearthError);

impl From<InfraError> for HearthError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<HearthError> for InfraError {
    fn from(value: HearthError) -> Self {
        InfraError(value)
    }
}

/// Render an error with its source chain, `outer: inner: root`
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → HearthError */
/* -------------------------------------------------------------------------- */

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        if value.is_timeout() {
            return InfraError(HearthError::Network("HTTP request timed out".into()));
        }

        if value.is_connect() {
            return InfraError(HearthError::Network(format!(
                "HTTP connection failure: {}",
                describe(&value)
            )));
        }

        if let Some(status) = value.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));
            return InfraError(match code {
                404 => HearthError::NotFound(message),
                400..=499 => HearthError::InvalidInput(message),
                _ => HearthError::Network(message),
            });
        }

        if value.is_builder() {
            return InfraError(HearthError::InvalidInput(describe(&value)));
        }

        InfraError(HearthError::Network(describe(&value)))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → DispatchError */
/* -------------------------------------------------------------------------- */

/// Classify a failed send or body read into the dispatch taxonomy
///
/// Only deadline expiry becomes `Timeout`; every other transport problem
/// (refused, reset, DNS, TLS, truncated body) is `ConnectFailed`.
pub fn classify_transport_error(err: &HttpError, timeout: Duration) -> DispatchError {
    if err.is_timeout() {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        return DispatchError::Timeout { timeout_ms };
    }
    DispatchError::ConnectFailed { message: describe(err) }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
