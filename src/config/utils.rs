//! Configuration loading, reloading, and access helpers

use super::schemas::Config;
use crate::logger::{self, LogTag};
use once_cell::sync::OnceCell;
use std::sync::RwLock;

/// Global configuration instance. Single source of truth for all settings;
/// access it through the helper functions below.
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Load configuration from the default path and initialize the global CONFIG.
/// Creates the file with defaults when it does not exist.
pub fn load_config() -> Result<(), String> {
    let config_path = crate::paths::config_path();
    load_config_from_path(&config_path.to_string_lossy())
}

/// Load configuration from a specific TOML file path
pub fn load_config_from_path(path: &str) -> Result<(), String> {
    let config = if std::path::Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path, e))?;
        toml::from_str::<Config>(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path, e))?
    } else {
        logger::warning(
            LogTag::System,
            &format!("Config file '{}' not found, writing defaults", path),
        );
        let defaults = Config::default();
        if let Some(parent) = std::path::Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let serialized = toml::to_string_pretty(&defaults)
            .map_err(|e| format!("Failed to serialize default config: {}", e))?;
        std::fs::write(path, serialized)
            .map_err(|e| format!("Failed to write default config '{}': {}", path, e))?;
        defaults
    };

    config.confidence_weights.validate()?;

    if config.execution.order_type.eq_ignore_ascii_case("MARKET") {
        return Err("execution.order_type MARKET is prohibited, use LIMIT".to_string());
    }

    match CONFIG.set(RwLock::new(config)) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Already initialized (tests, hot reload): replace in place
            if let Some(lock) = CONFIG.get() {
                if let Ok(contents) = std::fs::read_to_string(path) {
                    if let Ok(fresh) = toml::from_str::<Config>(&contents) {
                        if let Ok(mut guard) = lock.write() {
                            *guard = fresh;
                        }
                    }
                }
            }
            Ok(())
        }
    }
}

/// Thread-safe read access to the configuration.
/// Falls back to defaults when called before load_config (tests).
pub fn with_config<T>(f: impl FnOnce(&Config) -> T) -> T {
    match CONFIG.get() {
        Some(lock) => match lock.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        },
        None => f(&Config::default()),
    }
}

/// True when the agent must not place real orders.
/// Simulation config or the --paper flag both force it.
pub fn is_simulation_mode() -> bool {
    crate::arguments::is_paper_forced() || with_config(|c| c.simulation.enabled)
}
