use stockagent::{
    arguments::{self, is_run_enabled, print_debug_info, print_help},
    logger::{self, LogTag},
};

/// Main entry point
///
/// Routes execution based on command-line arguments:
/// - `--help`: display usage and exit
/// - `--run [--paper]`: start the trading agent
#[tokio::main]
async fn main() {
    if arguments::is_help_requested() {
        print_help();
        std::process::exit(0);
    }

    logger::info(LogTag::System, "🚀 StockAgent starting up");
    print_debug_info();

    if !is_run_enabled() {
        logger::error(LogTag::System, "No execution mode specified");
        print_help();
        std::process::exit(1);
    }

    match stockagent::run::run_bot().await {
        Ok(()) => {
            logger::success(LogTag::System, "StockAgent exited");
        }
        Err(e) => {
            logger::error(LogTag::System, &format!("StockAgent failed: {}", e));
            std::process::exit(1);
        }
    }
}
