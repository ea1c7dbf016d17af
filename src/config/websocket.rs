use serde::{Deserialize, Serialize};

fn default_auth_timeout_secs() -> u64 {
    30
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_connection_timeout_secs() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    64
}

/// WebSocket endpoint settings. The three timeouts map to the
/// `AUTH_TIMEOUT`, `WS_HEARTBEAT_INTERVAL` and `WS_CONNECTION_TIMEOUT`
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Seconds a fresh socket gets to complete the auth handshake.
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
    /// Expected client ping cadence.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Connections silent for longer than this are dropped by the sweep.
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    /// Outbound queue depth per connection; a full queue drops the client.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            auth_timeout_secs: default_auth_timeout_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            connection_timeout_secs: default_connection_timeout_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}
