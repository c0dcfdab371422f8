//! Service lifecycle framework
//!
//! Every long-running part of the agent (broker session, registry, Telegram
//! poller, scheduler loops, webserver) is a Service managed by the
//! ServiceManager: initialized and started in priority order, stopped in
//! reverse via a shared shutdown Notify.

pub mod implementations;

use crate::logger::{self, LogTag};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Core trait all services implement
#[async_trait]
pub trait Service: Send + Sync {
    /// Unique service identifier
    fn name(&self) -> &'static str;

    /// Lower priority starts earlier and stops later
    fn priority(&self) -> i32 {
        100
    }

    /// Names of services that must be started before this one
    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }

    /// Disabled services are skipped entirely
    fn is_enabled(&self) -> bool {
        true
    }

    /// One-time setup before start
    async fn initialize(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Spawn the service's background tasks. Tasks must exit when the
    /// shutdown notify fires.
    async fn start(
        &mut self,
        shutdown: Arc<Notify>,
        monitor: tokio_metrics::TaskMonitor,
    ) -> Result<Vec<JoinHandle<()>>, String>;

    /// Final cleanup after the tasks have been joined
    async fn stop(&mut self) -> Result<(), String> {
        Ok(())
    }
}

pub struct ServiceManager {
    services: HashMap<&'static str, Box<dyn Service>>,
    handles: HashMap<&'static str, Vec<JoinHandle<()>>>,
    started_order: Vec<&'static str>,
    shutdown: Arc<Notify>,
    task_monitors: HashMap<&'static str, tokio_metrics::TaskMonitor>,
}

impl ServiceManager {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            handles: HashMap::new(),
            started_order: Vec::new(),
            shutdown: Arc::new(Notify::new()),
            task_monitors: HashMap::new(),
        }
    }

    /// Register a service for management
    pub fn register(&mut self, service: Box<dyn Service>) {
        let name = service.name();
        self.services.insert(name, service);
    }

    fn task_monitor(&mut self, name: &'static str) -> tokio_metrics::TaskMonitor {
        self.task_monitors
            .entry(name)
            .or_insert_with(tokio_metrics::TaskMonitor::new)
            .clone()
    }

    /// Starts every enabled service in priority order, verifying that each
    /// one's dependencies started first.
    pub async fn start_all(&mut self) -> Result<(), String> {
        let mut ordered: Vec<&'static str> = self
            .services
            .iter()
            .filter(|(_, s)| s.is_enabled())
            .map(|(name, _)| *name)
            .collect();
        ordered.sort_by_key(|name| {
            self.services
                .get(name)
                .map(|s| s.priority())
                .unwrap_or(i32::MAX)
        });

        logger::info(
            LogTag::System,
            &format!("Starting {} services: {}", ordered.len(), ordered.join(", ")),
        );

        let mut started: Vec<&'static str> = Vec::new();
        for name in ordered {
            let monitor = self.task_monitor(name);
            let Some(service) = self.services.get_mut(name) else {
                continue;
            };

            for dep in service.dependencies() {
                if !started.contains(&dep) {
                    return Err(format!(
                        "Service '{}' depends on '{}', which has not started",
                        name, dep
                    ));
                }
            }

            service
                .initialize()
                .await
                .map_err(|e| format!("Service '{}' failed to initialize: {}", name, e))?;
            let handles = service
                .start(self.shutdown.clone(), monitor)
                .await
                .map_err(|e| format!("Service '{}' failed to start: {}", name, e))?;

            logger::success(
                LogTag::System,
                &format!("Service '{}' started ({} tasks)", name, handles.len()),
            );
            self.handles.insert(name, handles);
            started.push(name);
        }

        self.started_order = started;
        Ok(())
    }

    /// Signals shutdown, joins every task, and stops services in reverse
    /// start order.
    pub async fn stop_all(&mut self) -> Result<(), String> {
        logger::info(LogTag::System, "Stopping all services");
        self.shutdown.notify_waiters();

        for name in self.started_order.clone().into_iter().rev() {
            if let Some(handles) = self.handles.remove(name) {
                for handle in handles {
                    // Give each task a bounded window to wind down
                    let abort = handle.abort_handle();
                    let joined =
                        tokio::time::timeout(std::time::Duration::from_secs(10), handle).await;
                    if joined.is_err() {
                        logger::warning(
                            LogTag::System,
                            &format!("Service '{}' task did not stop in time, aborting", name),
                        );
                        abort.abort();
                    }
                }
            }
            if let Some(service) = self.services.get_mut(name) {
                if let Err(e) = service.stop().await {
                    logger::warning(LogTag::System, &format!("Service '{}' stop error: {}", name, e));
                }
                logger::info(LogTag::System, &format!("Service '{}' stopped", name));
            }
        }

        self.started_order.clear();
        Ok(())
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static START_COUNTER: AtomicUsize = AtomicUsize::new(0);

    struct Recorder {
        name: &'static str,
        priority: i32,
        started_at: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Service for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn start(
            &mut self,
            _shutdown: Arc<Notify>,
            _monitor: tokio_metrics::TaskMonitor,
        ) -> Result<Vec<JoinHandle<()>>, String> {
            self.started_at
                .store(START_COUNTER.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_priority_ordering() {
        let first = Arc::new(AtomicUsize::new(usize::MAX));
        let second = Arc::new(AtomicUsize::new(usize::MAX));

        let mut manager = ServiceManager::new();
        manager.register(Box::new(Recorder {
            name: "late",
            priority: 50,
            started_at: second.clone(),
        }));
        manager.register(Box::new(Recorder {
            name: "early",
            priority: 10,
            started_at: first.clone(),
        }));

        manager.start_all().await.expect("start");
        assert!(first.load(Ordering::SeqCst) < second.load(Ordering::SeqCst));
        manager.stop_all().await.expect("stop");
    }

    struct Dependent;

    #[async_trait]
    impl Service for Dependent {
        fn name(&self) -> &'static str {
            "dependent"
        }

        fn priority(&self) -> i32 {
            5
        }

        fn dependencies(&self) -> Vec<&'static str> {
            vec!["missing"]
        }

        async fn start(
            &mut self,
            _shutdown: Arc<Notify>,
            _monitor: tokio_metrics::TaskMonitor,
        ) -> Result<Vec<JoinHandle<()>>, String> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_missing_dependency_rejected() {
        let mut manager = ServiceManager::new();
        manager.register(Box::new(Dependent));
        assert!(manager.start_all().await.is_err());
    }
}
