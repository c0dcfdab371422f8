//! Broker session service
//!
//! Establishes the SmartAPI session at startup in live mode. Individual
//! calls re-login inline when the 8-hour token lapses, so no background
//! task is needed here.

use crate::broker::broker;
use crate::config;
use crate::logger::{self, LogTag};
use crate::services::Service;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub struct BrokerService;

#[async_trait]
impl Service for BrokerService {
    fn name(&self) -> &'static str {
        "broker"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn initialize(&mut self) -> Result<(), String> {
        if config::utils::is_simulation_mode() {
            logger::info(LogTag::Broker, "Simulation mode, broker login deferred");
            return Ok(());
        }
        // A failed login must not kill startup: data endpoints retry on use
        if let Err(e) = broker().login().await {
            logger::warning(
                LogTag::Broker,
                &format!("Initial broker login failed ({}), will retry on first call", e),
            );
        }
        Ok(())
    }

    async fn start(
        &mut self,
        _shutdown: Arc<Notify>,
        _monitor: tokio_metrics::TaskMonitor,
    ) -> Result<Vec<JoinHandle<()>>, String> {
        Ok(vec![])
    }
}
