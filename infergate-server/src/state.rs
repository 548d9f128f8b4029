//! Application state for the infergate server.

use infergate_core::{Dispatcher, ModelRegistry, VectorStore};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::ServerConfig;

/// Application state shared across all handlers
pub struct AppState {
    /// Process-lifetime dispatcher
    pub dispatcher: Arc<Dispatcher>,

    /// Embedded documents for `/v1/vec/*`
    pub vectors: Mutex<VectorStore>,

    /// Server start time (for uptime)
    pub started_at: Instant,

    /// Configuration
    pub config: ServerConfig,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServerConfig, registry: ModelRegistry) -> Self {
        let dispatcher = Dispatcher::new(registry, config.dispatcher.clone());
        Self::with_dispatcher(config, Arc::new(dispatcher))
    }

    /// Create state around an existing dispatcher
    pub fn with_dispatcher(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            vectors: Mutex::new(VectorStore::new()),
            started_at: Instant::now(),
            config,
        }
    }

    /// Seconds since startup, rounded to two decimals
    pub fn uptime_secs(&self) -> f64 {
        (self.started_at.elapsed().as_secs_f64() * 100.0).round() / 100.0
    }
}
