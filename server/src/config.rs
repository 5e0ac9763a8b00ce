//! Server configuration
//!
//! Configuration is loaded from environment variables over built-in defaults.

use crate::coordinator::CoordinatorConfig;
use std::env;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Origins allowed for browser clients (empty = any)
    pub cors_allowed_origins: Vec<String>,

    /// WebSocket configuration
    pub websocket: WebSocketConfig,

    /// Room configuration
    pub room: RoomConfig,
}

/// WebSocket transport configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Keepalive ping period
    pub ping_interval: Duration,
    /// Extra silence tolerated after a missed ping before the connection is dropped
    pub ping_timeout: Duration,
    /// Per-connection outbound buffer, in messages
    pub outbox_capacity: usize,
    /// Maximum inbound frame size in bytes
    pub max_message_size: usize,
}

/// Room-related configuration
#[derive(Debug, Clone, Default)]
pub struct RoomConfig {
    /// Maximum participants per room (0 = unlimited)
    pub max_participants: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_allowed_origins: Vec::new(),
            websocket: WebSocketConfig::default(),
            room: RoomConfig::default(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(25),
            ping_timeout: Duration::from_secs(20),
            outbox_capacity: 256,
            max_message_size: 1024 * 1024, // 1 MB
        }
    }
}

impl WebSocketConfig {
    /// Silence after which a connection is considered dead
    pub fn liveness_timeout(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // Server config
        if let Some(host) = var("HOST") {
            config.host = host;
        }
        if let Some(port) = var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }
        if let Some(origins) = var("CORS_ALLOWED_ORIGINS") {
            config.cors_allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        // WebSocket config
        if let Some(val) = var("PING_INTERVAL_SECS")
            && let Ok(secs) = val.parse::<u64>()
            && secs > 0
        {
            config.websocket.ping_interval = Duration::from_secs(secs);
        }
        if let Some(val) = var("PING_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.websocket.ping_timeout = Duration::from_secs(secs);
        }
        if let Some(val) = var("OUTBOX_CAPACITY")
            && let Ok(capacity) = val.parse::<usize>()
            && capacity > 0
        {
            config.websocket.outbox_capacity = capacity;
        }
        if let Some(val) = var("MAX_MESSAGE_SIZE_KB")
            && let Ok(kb) = val.parse::<usize>()
            && kb > 0
        {
            config.websocket.max_message_size = kb.saturating_mul(1024);
        }

        // Room config
        if let Some(val) = var("MAX_PARTICIPANTS_PER_ROOM")
            && let Ok(max) = val.parse()
        {
            config.room.max_participants = max;
        }

        config
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_participants_per_room: match self.room.max_participants {
                0 => None,
                max => Some(max),
            },
        }
    }
}
