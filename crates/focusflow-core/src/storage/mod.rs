mod config;
pub mod database;
pub mod migrations;
pub mod session_log;

pub use config::{Config, NotificationsConfig};
pub use database::{Database, Stats};
pub use session_log::{SessionLog, SessionStore};

use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Returns `~/.config/focusflow[-dev]/` based on FOCUSFLOW_ENV.
///
/// Set FOCUSFLOW_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FOCUSFLOW_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("focusflow-dev")
    } else {
        base_dir.join("focusflow")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
