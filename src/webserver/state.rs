//! Shared application state for route handlers

use chrono::{DateTime, Utc};

#[derive(Clone)]
pub struct AppState {
    /// Server startup time, for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            startup_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.startup_time).num_seconds()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
