//! Application State
//!
//! Shared state accessible by all API handlers.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ApiConfig;
use crate::finder::Finder;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Resolver over the configured namespaces
    pub finder: Arc<Finder>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(finder: Arc<Finder>, config: ApiConfig) -> Self {
        Self {
            finder,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
