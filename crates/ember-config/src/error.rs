//! Error types for configuration loading

use std::path::PathBuf;

use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        /// Path that was being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not valid TOML for [`crate::EmberConfig`]
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered back to TOML
    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration parsed but holds values the dispatcher cannot use
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
