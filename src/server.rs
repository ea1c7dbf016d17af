use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::auth::TokenValidator;
use crate::cache::CacheStore;
use crate::config::Config;
use crate::presence::PresenceTracker;
use crate::protocol::{close_codes, RoomId};
use crate::repository::RoomRepository;

mod connection_manager;
mod game_session;
mod heartbeat;
mod message_router;
mod room_service;

pub use connection_manager::Outbound;
pub use message_router::HandlerResult;
pub use room_service::AuthAttempt;

use connection_manager::ConnectionManager;
use game_session::GameSession;

/// Runtime knobs derived from the loaded [`Config`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub default_max_players: u8,
    pub max_frame_size: usize,
    pub auth_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub connection_timeout: Duration,
    pub sweep_interval: Duration,
    pub queue_capacity: usize,
}

impl RuntimeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_max_players: config.server.default_max_players,
            max_frame_size: config.server.max_frame_size,
            auth_timeout: Duration::from_secs(config.websocket.auth_timeout_secs),
            heartbeat_interval: Duration::from_secs(config.websocket.heartbeat_interval_secs),
            connection_timeout: Duration::from_secs(config.websocket.connection_timeout_secs),
            sweep_interval: Duration::from_secs(config.server.sweep_interval_secs),
            queue_capacity: config.websocket.queue_capacity,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Keyed async locks realizing the per-room serialization discipline:
/// every room-state mutation runs inside the room's critical section,
/// while broadcasts happen after release with a snapshot captured inside.
pub(crate) struct RoomLocks {
    locks: DashMap<RoomId, Arc<Mutex<()>>>,
}

impl RoomLocks {
    fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub async fn lock(&self, room_id: RoomId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    pub fn forget(&self, room_id: &RoomId) {
        self.locks.remove(room_id);
    }
}

/// The session core: composes repository, cache, presence, token
/// validation, the connection tables and the per-room game sessions.
pub struct GameServer {
    pub(crate) repository: Arc<dyn RoomRepository>,
    pub(crate) cache: Arc<dyn CacheStore>,
    pub(crate) presence: PresenceTracker,
    pub(crate) validator: Arc<TokenValidator>,
    pub(crate) connections: ConnectionManager,
    pub(crate) sessions: DashMap<RoomId, Arc<GameSession>>,
    pub(crate) room_locks: RoomLocks,
    config: RuntimeConfig,
    server_id: Uuid,
}

impl GameServer {
    pub fn new(
        config: RuntimeConfig,
        repository: Arc<dyn RoomRepository>,
        cache: Arc<dyn CacheStore>,
        validator: Arc<TokenValidator>,
    ) -> Arc<Self> {
        let presence = PresenceTracker::new(cache.clone());
        Arc::new(Self {
            repository,
            cache,
            presence,
            validator,
            connections: ConnectionManager::new(),
            sessions: DashMap::new(),
            room_locks: RoomLocks::new(),
            config,
            server_id: Uuid::new_v4(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Identifier of this instance, echoed in `authenticated` replies.
    pub fn server_id(&self) -> Uuid {
        self.server_id
    }

    pub fn connection_count(&self) -> usize {
        self.connections.connection_count()
    }

    /// Register a connection backed by a bare channel, without a socket.
    /// Used by integration tests that hydrate server state directly.
    pub fn register_connection(
        &self,
        sender: tokio::sync::mpsc::Sender<Outbound>,
    ) -> crate::protocol::ConnectionId {
        self.connections.register(sender)
    }

    pub fn is_connection_authenticated(
        &self,
        connection_id: &crate::protocol::ConnectionId,
    ) -> bool {
        self.connections.is_authenticated(connection_id)
    }

    pub async fn health_check(&self) -> bool {
        true
    }

    /// Periodic stale-connection sweep; connections silent past the
    /// configured timeout are closed and cleaned up.
    pub fn spawn_sweep_task(self: &Arc<Self>) {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(server.config.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let stale = server
                    .connections
                    .collect_stale(server.config.connection_timeout);
                for connection_id in stale {
                    tracing::info!(%connection_id, "Dropping stale connection");
                    server
                        .connections
                        .close(&connection_id, close_codes::NORMAL);
                    server.disconnect_connection(&connection_id).await;
                }
            }
        });
    }

    /// Graceful shutdown: close every socket with `going_away` and settle
    /// presence counters.
    pub async fn shutdown(&self) {
        let connection_ids = self.connections.all_connection_ids();
        tracing::info!(
            connections = connection_ids.len(),
            "Shutting down, closing all connections"
        );
        for connection_id in connection_ids {
            self.connections
                .close(&connection_id, close_codes::GOING_AWAY);
            self.disconnect_connection(&connection_id).await;
        }
    }
}
