//! Renderer bridge settings
//!
//! Decides which native renderer library is loaded, where it is searched
//! for, and how callback failures swallowed at the native boundary are
//! reported.
//!
//! # Precedence
//!
//! Later sources override earlier ones:
//! 1. `~/.plotbridge/config.toml`
//! 2. `plotbridge.toml`, searched upwards from the start directory
//! 3. `PLOTBRIDGE_*` environment variables
//!
//! # Example
//!
//! ```no_run
//! use plotbridge_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("renderer: {}", config.library());
//! ```

pub mod global;
pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Errors loading bridge settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("settings file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("invalid settings in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("home directory not found")]
    HomeNotFound,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader};
pub use project::{CallbacksConfig, NativeConfig, ProjectConfig};
