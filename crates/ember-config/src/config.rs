//! Top-level configuration and loading

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::components::{DispatcherConfig, PoolConfig};
use crate::error::{ConfigError, ConfigResult};

/// Complete ember configuration.
///
/// ```toml
/// [pool]
/// max_free_per_kind = 32
///
/// [dispatcher]
/// queue_warn_threshold = 256
/// trace_dispatch = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmberConfig {
    /// Event pool settings
    pub pool: PoolConfig,
    /// Dispatcher settings
    pub dispatcher: DispatcherConfig,
}

impl EmberConfig {
    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file.
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded ember config from {}", path.display());
        Ok(config)
    }

    /// Render this configuration as TOML.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Check values that parse but cannot be used.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.dispatcher.queue_warn_threshold == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.queue_warn_threshold must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
