//! Instrument registry service
//!
//! Loads the scrip master at startup so token resolution works before the
//! first scheduled refresh. The daily midnight reload is driven by the
//! scheduler.

use crate::broker;
use crate::services::Service;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub struct InstrumentsService;

#[async_trait]
impl Service for InstrumentsService {
    fn name(&self) -> &'static str {
        "instruments"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn initialize(&mut self) -> Result<(), String> {
        broker::reload_instruments().await;
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
