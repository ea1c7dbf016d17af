use serde::{Deserialize, Serialize};

fn default_max_players() -> u8 {
    4
}

fn default_max_frame_size() -> usize {
    65536 // 64KB
}

fn default_sweep_interval_secs() -> u64 {
    15
}

/// Server behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Seats allocated when a create request does not name a count.
    #[serde(default = "default_max_players")]
    pub default_max_players: u8,
    /// Inbound frames above this size are rejected without disconnecting.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Cadence of the stale-connection sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            default_max_players: default_max_players(),
            max_frame_size: default_max_frame_size(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}
