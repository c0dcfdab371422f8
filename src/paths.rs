//! Centralized path resolution for the agent
//!
//! All file and directory paths go through this module so the bot behaves the
//! same regardless of working directory.
//!
//! ```text
//! ~/.stockagent/           (Linux; ~/StockAgent elsewhere)
//! ├── data/
//! │   ├── config.toml
//! │   ├── trades.db
//! │   └── telegram_offset
//! └── logs/
//!     └── stockagent.log
//! ```

use once_cell::sync::Lazy;
use std::path::PathBuf;

/// Lazy-initialized base directory (thread-safe)
static BASE_DIRECTORY: Lazy<PathBuf> = Lazy::new(resolve_base_directory);

/// Resolves the base directory for all agent data
fn resolve_base_directory() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

    #[cfg(target_os = "linux")]
    let base = home.join(".stockagent");

    #[cfg(not(target_os = "linux"))]
    let base = home.join("StockAgent");

    base
}

/// Returns the base directory for all agent data
pub fn base_directory() -> PathBuf {
    BASE_DIRECTORY.clone()
}

/// Returns the data directory (config, database, state files)
pub fn data_directory() -> PathBuf {
    BASE_DIRECTORY.join("data")
}

/// Returns the logs directory
pub fn logs_directory() -> PathBuf {
    BASE_DIRECTORY.join("logs")
}

/// Returns the main configuration file path.
/// `--config <path>` overrides the default location.
pub fn config_path() -> PathBuf {
    if let Some(path) = crate::arguments::get_arg_value("--config") {
        return PathBuf::from(path);
    }
    data_directory().join("config.toml")
}

/// Returns the trade-record database path
pub fn database_path() -> PathBuf {
    data_directory().join("trades.db")
}

/// Returns the Telegram update-offset state file path
pub fn telegram_offset_path() -> PathBuf {
    data_directory().join("telegram_offset")
}

/// Returns the log file path
pub fn log_file_path() -> PathBuf {
    logs_directory().join("stockagent.log")
}

/// Creates the data and logs directories if they do not exist yet
pub fn ensure_directories() -> Result<(), String> {
    for dir in [data_directory(), logs_directory()] {
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create directory {}: {}", dir.display(), e))?;
    }
    Ok(())
}
