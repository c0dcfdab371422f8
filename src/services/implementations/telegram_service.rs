//! Telegram service
//!
//! Validates the bot token, restores the persisted update offset, and runs
//! the long-poll loop that feeds operator replies to the approval gateway.

use crate::logger::{self, LogTag};
use crate::services::Service;
use crate::telegram::{self, poller};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub struct TelegramService;

#[async_trait]
impl Service for TelegramService {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn priority(&self) -> i32 {
        30
    }

    async fn initialize(&mut self) -> Result<(), String> {
        // Restore the offset BEFORE the first poll so replies consumed in a
        // previous run are never re-dispatched
        poller::restore_offset();
        telegram::init_bot().await
    }

    async fn start(
        &mut self,
        shutdown: Arc<Notify>,
        monitor: tokio_metrics::TaskMonitor,
    ) -> Result<Vec<JoinHandle<()>>, String> {
        if !telegram::is_configured() {
            logger::info(
                LogTag::Telegram,
                "Telegram not configured, approval workflow disabled",
            );
            return Ok(vec![]);
        }

        let handle = tokio::spawn(monitor.instrument(poller::run_poll_loop(shutdown)));
        Ok(vec![handle])
    }
}
