//! Renderer library loading
//!
//! Locates the renderer shared library with platform naming conventions,
//! loads it through `libloading`, and resolves the `RendererApi` table by
//! symbol name.

use crate::ffi::native::RendererApi;
use libloading::{Library, Symbol};
use plotbridge_config::Config;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Library loading errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    /// Library file not found in search paths
    #[error("library not found: {0}")]
    LibraryNotFound(String),
    /// Symbol not found in library
    #[error("symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound { library: String, symbol: String },
    /// Dynamic loader rejected the file
    #[error("failed to load library: {0}")]
    LoadFailed(String),
}

/// A loaded renderer library
///
/// # Safety
///
/// Loading a dynamic library runs its initialization code in this process.
/// Only load trusted renderer builds.
pub struct NativeLibrary {
    name: String,
    path: PathBuf,
    library: Library,
}

impl NativeLibrary {
    /// Load `name` (short name or path), searching `extra_search_paths` first
    #[instrument(skip(extra_search_paths), fields(extra = extra_search_paths.len()))]
    pub fn open(name: &str, extra_search_paths: &[PathBuf]) -> Result<Self, LoadError> {
        let mut search_paths = extra_search_paths.to_vec();
        search_paths.extend(default_search_paths());

        let path = resolve_library_path(name, &search_paths)
            .ok_or_else(|| LoadError::LibraryNotFound(name.to_string()))?;

        // SAFETY: see the type-level note; the caller chose this library.
        let library = unsafe { Library::new(&path).map_err(|e| LoadError::LoadFailed(e.to_string()))? };
        info!(library = name, path = %path.display(), "loaded renderer library");

        Ok(Self {
            name: name.to_string(),
            path,
            library,
        })
    }

    /// Load the library named by the merged configuration
    pub fn from_config(config: &Config) -> Result<Self, LoadError> {
        Self::open(config.library(), config.search_paths())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up one function pointer
    ///
    /// # Safety
    ///
    /// `T` must match the symbol's real C signature.
    unsafe fn symbol<T: Copy>(&self, symbol: &str) -> Result<T, LoadError> {
        let found: Symbol<'_, T> = self
            .library
            .get(symbol.as_bytes())
            .map_err(|_| LoadError::SymbolNotFound {
                library: self.name.clone(),
                symbol: symbol.to_string(),
            })?;
        debug!(symbol, "resolved symbol");
        Ok(*found)
    }

    /// Resolve the full renderer table
    ///
    /// The returned pointers are valid only while this library stays loaded.
    pub fn api(&self) -> Result<RendererApi, LoadError> {
        macro_rules! resolve_table {
            ($lib:expr, [$($field:ident),* $(,)?]) => {
                // SAFETY: field types in RendererApi mirror the renderer's C prototypes.
                unsafe {
                    RendererApi {
                        $($field: $lib.symbol(stringify!($field))?,)*
                    }
                }
            };
        }

        Ok(resolve_table!(
            self,
            [
                s2open, s2show, s2disp, s2swin, s2qwin, s2line, s2pnts, s2surp, ns2vf3, ns2vf4,
                ds2ah, ss2lt, ss2gpix, ns2cvr, ds2dvr, ns2cis, ns2cisc, ns2dis, s2funt, s2funtc,
                s2funxy, s2funuv, cs2scb, cs2scbx, cs2skcb, cs2sncb, cs2shcb, cs2sdhcb, cs2spcb,
                cs2ecb, cs2dcb, cs2tcb, xs2qsp, free,
            ]
        ))
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// Platform library search paths, current directory first
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/lib"));
        if cfg!(target_pointer_width = "64") {
            paths.push(PathBuf::from("/usr/lib64"));
            paths.push(PathBuf::from("/lib64"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/opt/homebrew/lib"));
        paths.push(PathBuf::from("/usr/lib"));
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(system_root) = std::env::var("SystemRoot") {
            paths.push(PathBuf::from(format!("{}\\System32", system_root)));
        }
    }

    paths
}

/// Resolve a library name to a file
///
/// - Existing path: used as is
/// - Short name: `lib{name}.so` / `lib{name}.dylib` / `{name}.dll` in each
///   search path, in order
fn resolve_library_path(name: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.components().count() > 1 && path.exists() {
        return Some(path.to_path_buf());
    }

    let extensions: &[&str] = if cfg!(target_os = "windows") {
        &["dll"]
    } else if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else {
        &["so"]
    };
    let prefixes: &[&str] = if cfg!(target_os = "windows") {
        &["", "lib"]
    } else {
        &["lib", ""]
    };

    search_paths.iter().find_map(|dir| {
        prefixes.iter().find_map(|prefix| {
            extensions.iter().find_map(|ext| {
                let candidate = dir.join(format!("{}{}.{}", prefix, name, ext));
                candidate.exists().then_some(candidate)
            })
        })
    })
}
