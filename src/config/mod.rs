//! Agent configuration
//!
//! TOML file under the data directory, loaded once at startup into a global
//! RwLock. All values have sensible defaults; a missing file is created with
//! them so the operator has something to edit.

pub mod schemas;
pub mod utils;

pub use schemas::Config;
pub use utils::{load_config, load_config_from_path, with_config};
