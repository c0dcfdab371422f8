/// Centralized argument handling for the agent
///
/// All command-line parsing and debug-flag checks live here so binaries and
/// tests can override arguments without touching `std::env` directly.
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

/// Global command-line arguments storage
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Sets the global command-line arguments (used by tests)
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

/// Gets a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        Err(_) => env::args().collect(),
    }
}

/// Checks if a specific argument is present
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Gets the value following a flag, or None
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    for (i, arg) in args.iter().enumerate() {
        if arg == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

// =============================================================================
// EXECUTION MODE FLAGS
// =============================================================================

/// Main run mode
pub fn is_run_enabled() -> bool {
    has_arg("--run")
}

/// Forces simulation mode regardless of config
pub fn is_paper_forced() -> bool {
    has_arg("--paper")
}

/// Help request
pub fn is_help_requested() -> bool {
    has_arg("--help") || has_arg("-h")
}

// =============================================================================
// DEBUG FLAGS
// =============================================================================

/// Data-ingestion debug mode
pub fn is_debug_data_enabled() -> bool {
    has_arg("--debug-data")
}

/// Analysis/scoring debug mode
pub fn is_debug_analysis_enabled() -> bool {
    has_arg("--debug-analysis")
}

/// Broker API debug mode
pub fn is_debug_broker_enabled() -> bool {
    has_arg("--debug-broker")
}

/// Telegram debug mode
pub fn is_debug_telegram_enabled() -> bool {
    has_arg("--debug-telegram")
}

/// True when any debug flag is set
pub fn is_any_debug_enabled() -> bool {
    get_cmd_args().iter().any(|a| a.starts_with("--debug-"))
}

/// Returns the list of enabled debug modes (without the --debug- prefix)
pub fn enabled_debug_modes() -> Vec<String> {
    get_cmd_args()
        .iter()
        .filter_map(|a| a.strip_prefix("--debug-").map(|s| s.to_string()))
        .collect()
}

/// Prints active debug modes at startup
pub fn print_debug_info() {
    let modes = enabled_debug_modes();
    if !modes.is_empty() {
        crate::logger::info(
            crate::logger::LogTag::System,
            &format!("Debug modes enabled: {}", modes.join(", ")),
        );
    }
}

/// Prints CLI usage
pub fn print_help() {
    println!("StockAgent — NSE equity trading agent");
    println!();
    println!("USAGE:");
    println!("  stockagent --run [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  --run              Start the agent");
    println!("  --paper            Force simulation mode (no real orders)");
    println!("  --config <path>    Use an alternate config file");
    println!("  --debug-data       Verbose data-ingestion logging");
    println!("  --debug-analysis   Verbose scoring logging");
    println!("  --debug-broker     Verbose broker API logging");
    println!("  --debug-telegram   Verbose Telegram logging");
    println!("  --help             Show this help");
}
