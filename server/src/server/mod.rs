pub mod routes;
pub mod websocket;

pub use routes::router;
pub use websocket::ws_handler;

use crate::config::WebSocketConfig;
use crate::coordinator::Coordinator;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub websocket: WebSocketConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            websocket: WebSocketConfig::default(),
            started_at: Instant::now(),
        }
    }

    pub fn with_websocket_config(mut self, websocket: WebSocketConfig) -> Self {
        self.websocket = websocket;
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
