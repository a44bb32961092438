//! Path management for Tally's persisted files.
//!
//! One settings file under the platform config directory:
//!
//! ```text
//! ~/.config/tally/             # Linux; platform equivalent elsewhere
//! └── settings.toml            # cached balance + auth token blob
//! ```

use std::path::PathBuf;

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Config directory could not be determined for this platform.
    ConfigDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find config directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Path resolution for Tally's persisted files.
pub struct AppPaths;

impl AppPaths {
    /// Returns the tally configuration directory.
    ///
    /// # Returns
    ///
    /// - `Ok(PathBuf)`: Path to config directory (e.g., `~/.config/tally/`)
    /// - `Err(PathError::ConfigDirNotFound)`: Could not determine directory
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join("tally"))
            .ok_or(PathError::ConfigDirNotFound)
    }

    /// Returns the path to the settings file.
    pub fn settings_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("settings.toml"))
    }
}
