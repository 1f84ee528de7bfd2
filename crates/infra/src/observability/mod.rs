//! Logging and tracing initialization
//!
//! Library code only emits `tracing` events; binaries call [`init_tracing`]
//! once at startup. The filter honours `RUST_LOG` and defaults to `info`.

use std::str::FromStr;

use hearth_domain::{HearthError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = HearthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" | "fmt" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(HearthError::InvalidInput(format!("Unknown log format: {other}"))),
        }
    }
}

fn env_filter() -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .map_err(|e| HearthError::Config(format!("Failed to create log filter: {e}")))
}

/// Install the global subscriber
///
/// Returns `Ok(false)` when a subscriber was already installed, so calling
/// this more than once is harmless.
pub fn init_tracing(format: LogFormat) -> Result<bool> {
    let filter = env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).compact().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .try_init(),
    };
    Ok(installed.is_ok())
}
