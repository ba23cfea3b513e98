//! Cross-Platform Path Utilities
//!
//! Functions for resolving the orchestrator's directories across platforms.
//! Handles ~/.webtest/ and the config file inside it.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the WebTest directory (~/.webtest/)
pub fn webtest_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".webtest"))
}

/// Get the config file path (~/.webtest/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(webtest_dir()?.join("config.json"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the WebTest directory, creating if it doesn't exist
pub fn ensure_webtest_dir() -> AppResult<PathBuf> {
    let path = webtest_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}
