//! Error types for shared domain types.

use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A layer could not be read or the merged tree did not deserialize
    #[error("Configuration error: {0}")]
    Load(String),

    /// Values deserialized but violate a constraint
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<::config::ConfigError> for SettingsError {
    fn from(e: ::config::ConfigError) -> Self {
        SettingsError::Load(e.to_string())
    }
}
