//! Distributed presence: per-user connection counters kept in the cache.
//!
//! Counters are shared across instances, so only atomic increments and
//! decrements touch them. Cache failures are logged and never surface to
//! the connection path.

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::protocol::UserId;

fn conn_count_key(user_id: &UserId) -> String {
    format!("ws:user:{user_id}:conn_count")
}

#[derive(Clone)]
pub struct PresenceTracker {
    cache: Arc<dyn CacheStore>,
}

impl PresenceTracker {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Record a new authenticated connection for the user.
    pub async fn on_connect(&self, user_id: &UserId) {
        let key = conn_count_key(user_id);
        if let Err(err) = self.cache.incr(&key).await {
            tracing::warn!(%user_id, error = %err, "Failed to increment presence counter");
        }
    }

    /// Record a closed connection; the key is removed once the last
    /// connection for the user is gone.
    pub async fn on_disconnect(&self, user_id: &UserId) {
        let key = conn_count_key(user_id);
        match self.cache.decr(&key).await {
            Ok(remaining) if remaining <= 0 => {
                if let Err(err) = self.cache.delete(&key).await {
                    tracing::warn!(%user_id, error = %err, "Failed to delete presence counter");
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(%user_id, error = %err, "Failed to decrement presence counter");
            }
        }
    }

    /// Whether the user has at least one live connection on any instance.
    pub async fn is_online(&self, user_id: &UserId) -> bool {
        let key = conn_count_key(user_id);
        match self.cache.get(&key).await {
            Ok(Some(raw)) => raw.parse::<i64>().map(|n| n > 0).unwrap_or(false),
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(%user_id, error = %err, "Failed to read presence counter");
                false
            }
        }
    }
}
