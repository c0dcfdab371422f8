//! Webserver service

use crate::config::with_config;
use crate::logger::{self, LogTag};
use crate::services::Service;
use crate::webserver;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub struct WebserverService;

#[async_trait]
impl Service for WebserverService {
    fn name(&self) -> &'static str {
        "webserver"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn is_enabled(&self) -> bool {
        with_config(|c| c.webserver.enabled)
    }

    async fn start(
        &mut self,
        shutdown: Arc<Notify>,
        monitor: tokio_metrics::TaskMonitor,
    ) -> Result<Vec<JoinHandle<()>>, String> {
        let handle = tokio::spawn(monitor.instrument(async move {
            if let Err(e) = webserver::start_server(shutdown).await {
                logger::error(LogTag::Webserver, &e);
            }
        }));
        Ok(vec![handle])
    }
}
