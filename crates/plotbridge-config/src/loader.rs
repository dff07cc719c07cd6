//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{CallbacksConfig, NativeConfig, ProjectConfig};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name
pub const PROJECT_FILE: &str = "plotbridge.toml";

/// Library loaded when nothing else is configured
pub const DEFAULT_LIBRARY: &str = "s2plot";

/// Suppressed-error log capacity when nothing else is configured
pub const DEFAULT_MAX_SUPPRESSED: usize = 64;

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.plotbridge/config.toml) - lowest priority
/// 2. Project config (./plotbridge.toml) - overrides global
/// 3. Environment variables (PLOTBRIDGE_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Effective native library settings
    pub native: NativeConfig,

    /// Effective callback settings
    pub callbacks: CallbacksConfig,

    /// Directory where plotbridge.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Create a loader that reads the global config from an explicit path
    pub fn with_global_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find plotbridge.toml, then merges it over
    /// the global config and applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        let global_config = self.load_global_config()?;

        let mut config = merge(global_config, project_config);
        config.project_root = project_root;
        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let global_config = self.load_global_config()?;

        let mut config = merge(global_config, project_config);
        config.project_root = config_path.parent().map(|p| p.to_path_buf());
        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_FILE);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Load global configuration; a missing file or home directory yields defaults
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        if self.global_config_path.is_none() {
            match GlobalConfig::global_config_path() {
                Ok(path) => self.global_config_path = Some(path),
                Err(ConfigError::HomeNotFound) => return Ok(GlobalConfig::default()),
                Err(e) => return Err(e),
            }
        }

        match &self.global_config_path {
            Some(path) if path.exists() => GlobalConfig::load_from_file(path),
            _ => Ok(GlobalConfig::default()),
        }
    }

    /// Get the global configuration directory (~/.plotbridge)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".plotbridge"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn merge(global: GlobalConfig, project: ProjectConfig) -> Config {
    let mut native = global.native.unwrap_or_default();
    if let Some(theirs) = project.native {
        if theirs.library.is_some() {
            native.library = theirs.library;
        }
        // Project search paths come first.
        let mut paths = theirs.search_paths;
        paths.extend(native.search_paths);
        native.search_paths = paths;
    }

    let mut callbacks = global.callbacks.unwrap_or_default();
    if let Some(theirs) = &project.callbacks {
        callbacks.overlay(theirs);
    }

    Config {
        native,
        callbacks,
        project_root: None,
    }
}

/// Apply environment variable overrides
///
/// - PLOTBRIDGE_LIBRARY: library name or path
/// - PLOTBRIDGE_LOG_CALLBACK_ERRORS: true/false
/// - PLOTBRIDGE_MAX_SUPPRESSED: positive integer
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Ok(library) = env::var("PLOTBRIDGE_LIBRARY") {
        if !library.trim().is_empty() {
            config.native.library = Some(library);
        }
    }

    if let Ok(log) = env::var("PLOTBRIDGE_LOG_CALLBACK_ERRORS") {
        let log_bool = matches!(log.to_lowercase().as_str(), "true" | "1" | "yes");
        config.callbacks.log_errors = Some(log_bool);
    }

    if let Ok(max) = env::var("PLOTBRIDGE_MAX_SUPPRESSED") {
        let parsed = max
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "PLOTBRIDGE_MAX_SUPPRESSED".to_string(),
                reason: format!("expected a positive integer, got '{}'", max),
            })?;
        config.callbacks.max_suppressed = Some(parsed);
    }

    Ok(())
}

impl Config {
    /// Effective library name (env > project > global > default)
    pub fn library(&self) -> &str {
        self.native.library.as_deref().unwrap_or(DEFAULT_LIBRARY)
    }

    /// Extra library search directories
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.native.search_paths
    }

    /// Whether swallowed callback failures are logged (default: true)
    pub fn log_callback_errors(&self) -> bool {
        self.callbacks.log_errors.unwrap_or(true)
    }

    /// Capacity of the suppressed callback error log
    pub fn max_suppressed(&self) -> usize {
        self.callbacks
            .max_suppressed
            .unwrap_or(DEFAULT_MAX_SUPPRESSED)
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a plotbridge.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}
