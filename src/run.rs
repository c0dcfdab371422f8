//! Bot lifecycle
//!
//! Wires everything together: logging, directories, config, database, the
//! ServiceManager, and the Ctrl+C shutdown path.

use crate::logger::{self, LogTag};
use crate::services::implementations::*;
use crate::services::ServiceManager;

/// Main agent execution: starts all services and blocks until shutdown.
pub async fn run_bot() -> Result<(), String> {
    crate::paths::ensure_directories()?;
    logger::init_file_logging();

    crate::config::load_config()?;
    logger::info(LogTag::System, "Configuration loaded");

    if crate::config::utils::is_simulation_mode() {
        logger::info(LogTag::System, "📄 SIMULATION MODE — no real orders will be placed");
    }

    crate::database::init_database().map_err(|e| format!("Database init failed: {}", e))?;
    logger::info(LogTag::System, "Trade store ready");

    let mut manager = ServiceManager::new();
    register_all_services(&mut manager);
    manager.start_all().await?;

    logger::success(LogTag::System, "✅ All services started — agent is running");

    wait_for_shutdown_signal().await?;

    logger::info(LogTag::System, "🛑 Initiating graceful shutdown");
    manager.stop_all().await?;
    logger::success(LogTag::System, "✅ Agent shut down cleanly");
    Ok(())
}

/// Registers every service; the manager handles ordering via priorities.
fn register_all_services(manager: &mut ServiceManager) {
    manager.register(Box::new(BrokerService)); // 10
    manager.register(Box::new(InstrumentsService)); // 20
    manager.register(Box::new(TelegramService)); // 30
    manager.register(Box::new(SchedulerService)); // 40
    manager.register(Box::new(WebserverService)); // 50
}

/// First Ctrl+C triggers graceful shutdown; a second one force-kills.
async fn wait_for_shutdown_signal() -> Result<(), String> {
    logger::info(LogTag::System, "Press Ctrl+C to stop (twice to force kill)");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for shutdown signal: {}", e))?;

    logger::warning(
        LogTag::System,
        "Shutdown signal received. Press Ctrl+C again to force kill.",
    );

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Force kill requested, exiting immediately");
            std::process::exit(130);
        }
    });

    Ok(())
}
