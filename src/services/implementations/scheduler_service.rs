//! Scheduler service
//!
//! Runs the wall-clock trigger loop and the intraday monitor loop.

use crate::scheduler;
use crate::services::Service;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub struct SchedulerService;

#[async_trait]
impl Service for SchedulerService {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    fn priority(&self) -> i32 {
        40
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["broker", "instruments", "telegram"]
    }

    async fn start(
        &mut self,
        shutdown: Arc<Notify>,
        monitor: tokio_metrics::TaskMonitor,
    ) -> Result<Vec<JoinHandle<()>>, String> {
        let triggers = tokio::spawn(
            monitor.instrument(scheduler::run_trigger_loop(shutdown.clone())),
        );
        let positions = tokio::spawn(monitor.instrument(scheduler::run_monitor_loop(shutdown)));
        Ok(vec![triggers, positions])
    }
}
