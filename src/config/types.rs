use serde::{Deserialize, Serialize};

use super::cache::CacheConfig;
use super::identity::IdentityConfig;
use super::logging::LoggingConfig;
use super::server::ServerSection;
use super::websocket::WebSocketConfig;

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> String {
    "*".to_string()
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-separated allowed origins, or `*`.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            cors_origins: default_cors_origins(),
            debug: false,
            server: ServerSection::default(),
            identity: IdentityConfig::default(),
            cache: CacheConfig::default(),
            websocket: WebSocketConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
