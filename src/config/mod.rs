//! Configuration: JSON file, environment overrides, and the well-known
//! deployment variables (`SUPABASE_URL`, `CACHE_URL`, `AUTH_TIMEOUT`, ...),
//! merged over compiled-in defaults.

pub mod cache;
pub mod identity;
pub mod loader;
pub mod logging;
pub mod server;
pub mod types;
pub mod validation;
pub mod websocket;

pub use cache::CacheConfig;
pub use identity::IdentityConfig;
pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use server::ServerSection;
pub use types::Config;
pub use validation::validate_config;
pub use websocket::WebSocketConfig;
