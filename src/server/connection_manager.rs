use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{ConnectionId, RoomId, ServerFrame, UserId};

/// What the socket pump consumes: a frame to serialize, or an order to
/// close with a specific code.
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(Arc<ServerFrame>),
    Close(u16),
}

#[derive(Debug, Clone)]
pub(crate) struct Connection {
    pub user_id: Option<UserId>,
    pub room_id: Option<RoomId>,
    pub authenticated: bool,
    pub last_seen: Instant,
    pub sender: mpsc::Sender<Outbound>,
}

/// Owner of all live socket handles on this instance, with secondary
/// indices by user and by room. Broadcasts only reach connections on this
/// instance; cross-instance fanout is a non-goal here.
pub(crate) struct ConnectionManager {
    connections: DashMap<ConnectionId, Connection>,
    by_user: DashMap<UserId, HashSet<ConnectionId>>,
    by_room: DashMap<RoomId, HashSet<ConnectionId>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            by_user: DashMap::new(),
            by_room: DashMap::new(),
        }
    }

    /// Track a freshly accepted, not yet authenticated socket.
    pub fn register(&self, sender: mpsc::Sender<Outbound>) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        self.connections.insert(
            connection_id,
            Connection {
                user_id: None,
                room_id: None,
                authenticated: false,
                last_seen: Instant::now(),
                sender,
            },
        );
        info!(%connection_id, "Connection registered");
        connection_id
    }

    /// Promote a connection: bind it to its user and room and subscribe it
    /// to room broadcasts.
    pub fn authenticate(&self, connection_id: &ConnectionId, user_id: UserId, room_id: RoomId) {
        let Some(mut connection) = self.connections.get_mut(connection_id) else {
            warn!(%connection_id, "Tried to authenticate unknown connection");
            return;
        };
        connection.user_id = Some(user_id);
        connection.room_id = Some(room_id);
        connection.authenticated = true;
        connection.last_seen = Instant::now();
        drop(connection);

        self.by_user
            .entry(user_id)
            .or_default()
            .insert(*connection_id);
        self.by_room
            .entry(room_id)
            .or_default()
            .insert(*connection_id);
        info!(%connection_id, %user_id, %room_id, "Connection authenticated and subscribed");
    }

    /// `(user_id, room_id)` for an authenticated connection.
    pub fn auth_context(&self, connection_id: &ConnectionId) -> Option<(UserId, RoomId)> {
        self.connections.get(connection_id).and_then(|c| {
            if c.authenticated {
                Some((c.user_id?, c.room_id?))
            } else {
                None
            }
        })
    }

    pub fn is_authenticated(&self, connection_id: &ConnectionId) -> bool {
        self.connections
            .get(connection_id)
            .is_some_and(|c| c.authenticated)
    }

    pub fn record_seen(&self, connection_id: &ConnectionId) {
        if let Some(mut connection) = self.connections.get_mut(connection_id) {
            connection.last_seen = Instant::now();
        }
    }

    /// Queue a frame for one connection. A connection whose queue is gone
    /// or full is dropped; the failure never propagates to the caller.
    pub fn send_to_connection(&self, connection_id: &ConnectionId, frame: Arc<ServerFrame>) {
        let sender = match self.connections.get(connection_id) {
            Some(connection) => connection.sender.clone(),
            None => return,
        };
        if sender.try_send(Outbound::Frame(frame)).is_err() {
            warn!(%connection_id, "Outbound queue unavailable, dropping connection");
            self.remove(connection_id);
        }
    }

    pub fn send_to_user(&self, user_id: &UserId, frame: &Arc<ServerFrame>) {
        let targets: Vec<ConnectionId> = self
            .by_user
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for connection_id in targets {
            self.send_to_connection(&connection_id, Arc::clone(frame));
        }
    }

    /// Fan a frame out to every subscriber of a room, optionally skipping
    /// the originating connection. A failed send drops that connection
    /// only; the broadcast continues.
    pub fn send_to_room(
        &self,
        room_id: &RoomId,
        frame: &Arc<ServerFrame>,
        except: Option<&ConnectionId>,
    ) {
        let targets: Vec<ConnectionId> = self
            .by_room
            .get(room_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for connection_id in targets {
            if except == Some(&connection_id) {
                continue;
            }
            self.send_to_connection(&connection_id, Arc::clone(frame));
        }
    }

    pub fn broadcast(&self, frame: &Arc<ServerFrame>) {
        let targets: Vec<ConnectionId> =
            self.connections.iter().map(|e| *e.key()).collect();
        for connection_id in targets {
            self.send_to_connection(&connection_id, Arc::clone(frame));
        }
    }

    /// Ask the socket pump to close with `code`. The connection stays
    /// tracked until the pump tears down and calls `remove`.
    pub fn close(&self, connection_id: &ConnectionId, code: u16) {
        if let Some(connection) = self.connections.get(connection_id) {
            let _ = connection.sender.try_send(Outbound::Close(code));
        }
    }

    /// Drop a connection from every index. Returns what was removed so the
    /// caller can settle presence and seat state.
    pub fn remove(&self, connection_id: &ConnectionId) -> Option<Connection> {
        let (_, connection) = self.connections.remove(connection_id)?;
        if let Some(user_id) = connection.user_id {
            if let Some(mut set) = self.by_user.get_mut(&user_id) {
                set.remove(connection_id);
            }
            self.by_user.remove_if(&user_id, |_, set| set.is_empty());
        }
        if let Some(room_id) = connection.room_id {
            if let Some(mut set) = self.by_room.get_mut(&room_id) {
                set.remove(connection_id);
            }
            self.by_room.remove_if(&room_id, |_, set| set.is_empty());
        }
        debug!(%connection_id, "Connection removed");
        Some(connection)
    }

    /// Unbind a connection from its room without closing the socket.
    pub fn unsubscribe_from_room(&self, connection_id: &ConnectionId) {
        let Some(mut connection) = self.connections.get_mut(connection_id) else {
            return;
        };
        let Some(room_id) = connection.room_id.take() else {
            return;
        };
        drop(connection);
        if let Some(mut set) = self.by_room.get_mut(&room_id) {
            set.remove(connection_id);
        }
        self.by_room.remove_if(&room_id, |_, set| set.is_empty());
    }

    /// Live connections a user has bound to one room. Seat `connected`
    /// flips false only when this reaches zero.
    pub fn user_connections_in_room(&self, user_id: &UserId, room_id: &RoomId) -> usize {
        let Some(user_set) = self.by_user.get(user_id) else {
            return 0;
        };
        let Some(room_set) = self.by_room.get(room_id) else {
            return 0;
        };
        user_set.iter().filter(|cid| room_set.contains(cid)).count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_connection_count(&self, room_id: &RoomId) -> usize {
        self.by_room.get(room_id).map(|set| set.len()).unwrap_or(0)
    }

    /// Connection ids silent for longer than `timeout`.
    pub fn collect_stale(&self, timeout: Duration) -> Vec<ConnectionId> {
        let now = Instant::now();
        self.connections
            .iter()
            .filter_map(|entry| {
                if now.duration_since(entry.last_seen) > timeout {
                    Some(*entry.key())
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn all_connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerMessage;

    fn channel() -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(4)
    }

    fn frame() -> Arc<ServerFrame> {
        Arc::new(ServerFrame::broadcast(ServerMessage::Pong {
            server_time: chrono::Utc::now(),
        }))
    }

    #[tokio::test]
    async fn register_authenticate_and_route_by_room() {
        let manager = ConnectionManager::new();
        let room = Uuid::new_v4();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();

        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        let cid_a = manager.register(tx_a);
        let cid_b = manager.register(tx_b);
        manager.authenticate(&cid_a, user_a, room);
        manager.authenticate(&cid_b, user_b, room);

        assert_eq!(manager.auth_context(&cid_a), Some((user_a, room)));
        assert_eq!(manager.room_connection_count(&room), 2);

        manager.send_to_room(&room, &frame(), Some(&cid_a));
        assert!(rx_b.try_recv().is_ok(), "other member receives broadcast");
        assert!(rx_a.try_recv().is_err(), "origin is excluded");

        manager.send_to_user(&user_a, &frame());
        assert!(rx_a.try_recv().is_ok());
    }

    #[tokio::test]
    async fn failed_send_drops_only_that_connection() {
        let manager = ConnectionManager::new();
        let room = Uuid::new_v4();

        let (tx_dead, rx_dead) = channel();
        drop(rx_dead); // receiver gone: sends will fail
        let (tx_live, mut rx_live) = channel();

        let cid_dead = manager.register(tx_dead);
        let cid_live = manager.register(tx_live);
        manager.authenticate(&cid_dead, Uuid::new_v4(), room);
        manager.authenticate(&cid_live, Uuid::new_v4(), room);

        manager.send_to_room(&room, &frame(), None);

        assert!(rx_live.try_recv().is_ok());
        assert!(manager.auth_context(&cid_dead).is_none());
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(manager.room_connection_count(&room), 1);
        let _ = cid_live;
    }

    #[tokio::test]
    async fn remove_clears_all_indices() {
        let manager = ConnectionManager::new();
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();

        let (tx, _rx) = channel();
        let cid = manager.register(tx);
        manager.authenticate(&cid, user, room);

        let removed = manager.remove(&cid).unwrap();
        assert_eq!(removed.user_id, Some(user));
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(manager.room_connection_count(&room), 0);
        assert_eq!(manager.user_connections_in_room(&user, &room), 0);
        assert!(manager.remove(&cid).is_none());
    }

    #[tokio::test]
    async fn user_connections_in_room_counts_per_room() {
        let manager = ConnectionManager::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        let user = Uuid::new_v4();

        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();
        let cid1 = manager.register(tx1);
        let cid2 = manager.register(tx2);
        manager.authenticate(&cid1, user, room_a);
        manager.authenticate(&cid2, user, room_b);

        assert_eq!(manager.user_connections_in_room(&user, &room_a), 1);
        assert_eq!(manager.user_connections_in_room(&user, &room_b), 1);

        manager.remove(&cid1);
        assert_eq!(manager.user_connections_in_room(&user, &room_a), 0);
        assert_eq!(manager.user_connections_in_room(&user, &room_b), 1);
    }

    #[tokio::test]
    async fn stale_connections_are_collected() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = channel();
        let cid = manager.register(tx);

        assert!(manager.collect_stale(Duration::from_secs(60)).is_empty());
        assert_eq!(manager.collect_stale(Duration::ZERO), vec![cid]);

        manager.record_seen(&cid);
        assert!(manager
            .collect_stale(Duration::from_secs(60))
            .is_empty());
    }
}
