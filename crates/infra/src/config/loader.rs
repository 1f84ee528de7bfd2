//! Configuration loader
//!
//! Loads the dispatch configuration from a file and environment variables.
//!
//! ## Loading Strategy
//! 1. Probes multiple paths for a config file
//! 2. If none is found, starts from the built-in defaults
//! 3. Overlays environment variables on top
//! 4. Validates the result
//!
//! ## Environment Variables
//! - `HEARTH_REGISTRY_URL`: Base URL of the service registry
//! - `HEARTH_REGISTRY_TIMEOUT_MS`: Registry load timeout in milliseconds
//! - `HEARTH_DEFAULT_TIMEOUT_MS`: Default per-request timeout in milliseconds
//! - `HEARTH_SESSION_CLEANUP_SECS`: Idle time before a session bucket is evicted
//! - `HEARTH_BREAKER_FAILURE_THRESHOLD`: Default breaker failure threshold
//! - `HEARTH_BREAKER_COOLDOWN_SECS`: Default breaker cooldown in seconds
//! - `HEARTH_USER_AGENT`: User agent sent on every outbound call
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./hearth.toml`, `./hearth.json`, `./config.toml`, `./config.json`
//! 2. The same names in the parent and grandparent directories
//! 3. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use hearth_domain::{DispatchConfig, HearthError, Result};

const CONFIG_FILE_NAMES: [&str; 4] = ["hearth.toml", "hearth.json", "config.toml", "config.json"];

/// Load configuration: file if one is found, defaults otherwise, then env
///
/// # Errors
/// Returns `HearthError::Config` if:
/// - A found file cannot be read or parsed
/// - An environment variable has an invalid value
/// - The merged configuration fails validation
pub fn load() -> Result<DispatchConfig> {
    let mut config = match probe_config_paths() {
        Some(path) => load_from_file(Some(path))?,
        None => {
            tracing::debug!("No config file found, using defaults");
            DispatchConfig::default()
        }
    };
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Built-in defaults with environment variables applied
///
/// # Errors
/// Returns `HearthError::Config` for unparseable values or an invalid result.
pub fn load_from_env() -> Result<DispatchConfig> {
    let mut config = DispatchConfig::default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    tracing::info!("Configuration loaded from environment variables");
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `HearthError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<DispatchConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(HearthError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            HearthError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| HearthError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<DispatchConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| HearthError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| HearthError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(HearthError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.extend([exe_dir.to_path_buf(), exe_dir.join(".."), exe_dir.join("../..")]);
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Overlay `HEARTH_*` environment variables onto `config`
///
/// # Errors
/// Returns `HearthError::Config` naming the variable that failed to parse.
pub fn apply_env_overrides(config: &mut DispatchConfig) -> Result<()> {
    if let Some(url) = env_var("HEARTH_REGISTRY_URL") {
        config.registry.url = Some(url);
    }
    if let Some(timeout) = env_parse("HEARTH_REGISTRY_TIMEOUT_MS")? {
        config.registry.timeout_ms = timeout;
    }
    if let Some(timeout) = env_parse("HEARTH_DEFAULT_TIMEOUT_MS")? {
        config.request_timeout_ms = timeout;
    }
    if let Some(secs) = env_parse("HEARTH_SESSION_CLEANUP_SECS")? {
        config.session_cleanup_secs = secs;
    }
    if let Some(threshold) = env_parse("HEARTH_BREAKER_FAILURE_THRESHOLD")? {
        config.default_breaker.failure_threshold = threshold;
    }
    if let Some(secs) = env_parse("HEARTH_BREAKER_COOLDOWN_SECS")? {
        config.default_breaker.cooldown_secs = secs;
    }
    if let Some(agent) = env_var("HEARTH_USER_AGENT") {
        config.pool.user_agent = agent;
    }
    Ok(())
}

/// Non-empty environment variable
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse a numeric environment variable if set
///
/// # Errors
/// Returns `HearthError::Config` if the variable is set but not a valid number.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| HearthError::Config(format!("Invalid value for {}: {}", key, e)))
        })
        .transpose()
}
