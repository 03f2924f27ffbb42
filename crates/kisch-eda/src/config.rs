use crate::LibraryError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variables holding extra symbol directories, in priority order.
const SYMBOL_DIR_VARS: &[&str] = &["KICAD_SYMBOL_DIR", "KICAD9_SYMBOL_DIR", "KICAD8_SYMBOL_DIR"];

/// Where to look for `<nickname>.kicad_sym` files.
///
/// ```toml
/// search_paths = ["libs", "/opt/kicad/symbols"]
/// include_system_paths = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directories searched first, in order
    pub search_paths: Vec<PathBuf>,
    /// Also search the platform's KiCad installation directories
    pub include_system_paths: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            include_system_paths: true,
        }
    }
}

impl LibraryConfig {
    /// Search only the given directories.
    pub fn with_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_paths: paths.into_iter().map(Into::into).collect(),
            include_system_paths: false,
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, LibraryError> {
        toml::from_str(text).map_err(|e| LibraryError::Config(e.to_string()))
    }

    /// Directories from `KICAD_SYMBOL_DIR` and the versioned KiCad variables,
    /// followed by the system installation paths.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        for var in SYMBOL_DIR_VARS {
            if let Some(value) = std::env::var_os(var) {
                config.search_paths.extend(std::env::split_paths(&value));
            }
        }
        log::debug!("Symbol search paths from environment: {:?}", config.search_paths);
        config
    }

    /// Every directory to search, in order. Missing directories are kept so
    /// that "not found" errors can list them.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.search_paths.clone();
        if self.include_system_paths {
            for path in system_symbol_dirs() {
                if !dirs.contains(&path) {
                    dirs.push(path);
                }
            }
        }
        dirs
    }
}

/// Default KiCad symbol directories for the current platform.
pub fn system_symbol_dirs() -> Vec<PathBuf> {
    let mut paths = if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/Applications/KiCad/KiCad.app/Contents/SharedSupport/symbols"),
            PathBuf::from("/Library/Application Support/kicad/symbols"),
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            PathBuf::from("C:\\Program Files\\KiCad\\share\\kicad\\symbols"),
            PathBuf::from("C:\\Program Files (x86)\\KiCad\\share\\kicad\\symbols"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/share/kicad/symbols"),
            PathBuf::from("/usr/local/share/kicad/symbols"),
            PathBuf::from("/opt/kicad/share/kicad/symbols"),
        ]
    };

    let user_dir = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library/Application Support/kicad/symbols"))
    } else if cfg!(target_os = "windows") {
        dirs::config_dir().map(|c| c.join("kicad\\symbols"))
    } else {
        dirs::home_dir().map(|h| h.join(".local/share/kicad/symbols"))
    };
    paths.extend(user_dir);
    paths
}
