//! Global Configuration (~/.plotbridge/config.toml)
//!
//! Handles user-level configuration stored in `~/.plotbridge/config.toml`.
//! It accepts the same sections as `plotbridge.toml`.

use crate::project::{CallbacksConfig, NativeConfig};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.plotbridge/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default native library settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<NativeConfig>,

    /// Default callback bridge settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callbacks: Option<CallbacksConfig>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(native) = &self.native {
            native.validate("native")?;
        }
        if let Some(callbacks) = &self.callbacks {
            callbacks.validate("callbacks")?;
        }
        Ok(())
    }

    /// Get the global config file path (~/.plotbridge/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".plotbridge").join("config.toml"))
    }

    /// Default library name, if configured
    pub fn default_library(&self) -> Option<&str> {
        self.native.as_ref().and_then(|n| n.library.as_deref())
    }

    /// Merge another global config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &GlobalConfig) {
        if other.native.is_some() {
            self.native = other.native.clone();
        }
        if let Some(theirs) = &other.callbacks {
            self.callbacks
                .get_or_insert_with(CallbacksConfig::default)
                .overlay(theirs);
        }
    }
}
