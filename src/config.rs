use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::SyncError;

/// Engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Relay endpoint (ws:// or wss:// URL)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Heartbeat interval while connected, in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Reconnect automatically after an unexpected transport close
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Give up reconnecting after this many consecutive failed attempts
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Cap on the exponential reconnect delay, in seconds
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Debounce window for presence broadcasts, in milliseconds
    #[serde(default = "default_presence_debounce_ms")]
    pub presence_debounce_ms: u64,

    /// Presence entries older than this are reported as away, in seconds
    #[serde(default = "default_presence_stale_secs")]
    pub presence_stale_secs: u64,

    /// Number of events retained in the history ring buffer
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl SyncConfig {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, SyncError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        match envy::prefixed("COLAB_").from_env::<SyncConfig>() {
            Ok(config) => {
                info!("Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                Err(SyncError::Config(e))
            }
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            auto_reconnect: default_auto_reconnect(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            max_backoff_secs: default_max_backoff_secs(),
            presence_debounce_ms: default_presence_debounce_ms(),
            presence_stale_secs: default_presence_stale_secs(),
            history_limit: default_history_limit(),
        }
    }
}

// Default value functions
fn default_endpoint() -> String {
    "ws://127.0.0.1:3001/sync".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_max_backoff_secs() -> u64 {
    30
}

fn default_presence_debounce_ms() -> u64 {
    100
}

fn default_presence_stale_secs() -> u64 {
    60
}

fn default_history_limit() -> usize {
    1000
}
