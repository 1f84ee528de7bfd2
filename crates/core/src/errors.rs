//! Error mapping between the primitive and domain layers

use hearth_common::ConfigError;
use hearth_domain::HearthError;

/// Lift a primitive validation failure into the domain error
pub fn config_error(err: ConfigError) -> HearthError {
    match err {
        ConfigError::Invalid { message } => HearthError::Config(message),
    }
}
