//! Project Configuration (plotbridge.toml)
//!
//! Handles project-level configuration stored in `plotbridge.toml`.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project configuration from plotbridge.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Native renderer library settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<NativeConfig>,

    /// Callback bridge settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callbacks: Option<CallbacksConfig>,
}

/// Native renderer library settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct NativeConfig {
    /// Library short name ("s2plot") or path to the shared object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,

    /// Extra directories searched before the system library paths
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,
}

/// Callback bridge settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CallbacksConfig {
    /// Log callback failures swallowed at the native boundary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_errors: Option<bool>,

    /// Capacity of the per-thread suppressed-error log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_suppressed: Option<usize>,
}

impl ProjectConfig {
    /// Load project configuration from a file
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

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(native) = &self.native {
            native.validate("native")?;
        }
        if let Some(callbacks) = &self.callbacks {
            callbacks.validate("callbacks")?;
        }
        Ok(())
    }

    /// Configured library name, if any
    pub fn library(&self) -> Option<&str> {
        self.native.as_ref().and_then(|n| n.library.as_deref())
    }
}

impl NativeConfig {
    pub(crate) fn validate(&self, section: &str) -> ConfigResult<()> {
        if let Some(library) = &self.library {
            if library.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.library", section),
                    reason: "library cannot be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl CallbacksConfig {
    pub(crate) fn validate(&self, section: &str) -> ConfigResult<()> {
        if self.max_suppressed == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.max_suppressed", section),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Overlay `other` onto `self`, keeping values `other` leaves unset
    pub fn overlay(&mut self, other: &CallbacksConfig) {
        if other.log_errors.is_some() {
            self.log_errors = other.log_errors;
        }
        if other.max_suppressed.is_some() {
            self.max_suppressed = other.max_suppressed;
        }
    }
}
