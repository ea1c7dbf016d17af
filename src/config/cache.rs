use serde::{Deserialize, Serialize};

/// Remote key-value cache endpoint (presence counters, denormalized room
/// state). Filled from `CACHE_URL` / `CACHE_TOKEN` when present; with no
/// endpoint configured the in-process cache is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}
