use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::protocol::{
    close_codes, ConnectionId, ErrorCode, RequestId, RoomClosedReason, RoomId, RoomSnapshot,
    ServerFrame, ServerMessage, UserId,
};
use crate::repository::{CreateRoomParams, CreatedRoom, RepositoryError};

use super::message_router::HandlerResult;
use super::GameServer;

/// Control-flow outcome of one `authenticate` frame. All replies and
/// broadcasts are already queued when this is returned; the endpoint only
/// decides whether the socket lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAttempt {
    /// Handshake complete; the connection is bound and subscribed.
    Authenticated,
    /// Recoverable failure; the client may retry until the deadline.
    Retry,
    /// Definitive failure; close with the carried code.
    Close(u16),
}

impl GameServer {
    /// Idempotent room creation, the service entry the HTTP wrappers and
    /// tests call. Repository first, then best-effort cache.
    pub async fn create_room(
        &self,
        user_id: UserId,
        request_id: RequestId,
        params: CreateRoomParams,
    ) -> Result<CreatedRoom, RepositoryError> {
        let created = self
            .repository
            .find_or_create(user_id, request_id, params)
            .await?;
        if let Ok(snapshot) = self.repository.get_snapshot(created.room_id).await {
            self.sync_room_cache(&snapshot).await;
        }
        info!(
            %user_id,
            room_id = %created.room_id,
            code = %created.code,
            cached = created.cached,
            "Room resolved for creator"
        );
        Ok(created)
    }

    /// Run the auth handshake for one `authenticate` frame: validate the
    /// token, resolve the room code, take (or re-take) a seat, bind the
    /// connection, and announce the updated room to the other members.
    pub async fn authenticate_connection(
        &self,
        connection_id: &ConnectionId,
        request_id: Option<Uuid>,
        token: &str,
        room_code: &str,
    ) -> AuthAttempt {
        let user = match self.validator.validate(token).await {
            Ok(user) => user,
            Err(AuthError::Expired) => {
                return self.auth_failure(
                    connection_id,
                    request_id,
                    ErrorCode::AuthExpired,
                    "token expired".to_string(),
                    None,
                );
            }
            Err(err @ AuthError::Invalid(_)) => {
                return self.auth_failure(
                    connection_id,
                    request_id,
                    ErrorCode::AuthFailed,
                    err.to_string(),
                    None,
                );
            }
        };

        let room = match self.repository.resolve_by_code(room_code).await {
            Ok(room) => room,
            Err(err) => {
                return self.auth_failure(
                    connection_id,
                    request_id,
                    ErrorCode::RoomNotFound,
                    err.to_string(),
                    Some(close_codes::ROOM_NOT_FOUND),
                );
            }
        };

        let snapshot = {
            let _guard = self.room_locks.lock(room.id).await;
            let join = match self
                .repository
                .join_seat(room.id, user.user_id, user.display_name.as_deref())
                .await
            {
                Ok(join) => join,
                Err(
                    err @ (RepositoryError::RoomClosed
                    | RepositoryError::RoomInGame
                    | RepositoryError::RoomFull),
                ) => {
                    return self.auth_failure(
                        connection_id,
                        request_id,
                        err.code(),
                        err.to_string(),
                        Some(close_codes::ROOM_ACCESS_DENIED),
                    );
                }
                Err(err) => {
                    return self.auth_failure(
                        connection_id,
                        request_id,
                        err.code(),
                        err.to_string(),
                        None,
                    );
                }
            };

            let snapshot = match self
                .repository
                .set_seat_connected(room.id, user.user_id, true)
                .await
            {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(room_id = %room.id, user_id = %user.user_id, error = %err,
                        "Failed to mark seat connected");
                    join.snapshot
                }
            };

            self.connections
                .authenticate(connection_id, user.user_id, room.id);
            self.presence.on_connect(&user.user_id).await;
            self.sync_room_cache(&snapshot).await;
            snapshot
        };

        self.connections.send_to_connection(
            connection_id,
            Arc::new(ServerFrame::reply(
                request_id,
                ServerMessage::Authenticated {
                    connection_id: *connection_id,
                    user_id: user.user_id,
                    server_id: self.server_id(),
                    room: snapshot.clone(),
                },
            )),
        );

        // A member rejoining a running game needs the full state to redraw;
        // they never receive historical events.
        if let Some(session) = self.sessions.get(&room.id).map(|e| Arc::clone(e.value())) {
            let state = session.state_snapshot().await;
            self.connections.send_to_connection(
                connection_id,
                Arc::new(ServerFrame::broadcast(ServerMessage::GameState {
                    room_id: room.id,
                    state,
                })),
            );
        }

        self.connections.send_to_room(
            &room.id,
            &Arc::new(ServerFrame::broadcast(ServerMessage::RoomUpdated {
                room: snapshot,
            })),
            Some(connection_id),
        );

        info!(
            %connection_id,
            user_id = %user.user_id,
            room_id = %room.id,
            room_code = %room.code,
            "Connection authenticated into room"
        );
        AuthAttempt::Authenticated
    }

    fn auth_failure(
        &self,
        connection_id: &ConnectionId,
        request_id: Option<Uuid>,
        code: ErrorCode,
        message: String,
        close_code: Option<u16>,
    ) -> AuthAttempt {
        warn!(%connection_id, ?code, %message, "Authentication attempt failed");
        self.connections.send_to_connection(
            connection_id,
            Arc::new(ServerFrame::reply(
                request_id,
                ServerMessage::Error { code, message },
            )),
        );
        match close_code {
            Some(code) => {
                self.connections.close(connection_id, code);
                AuthAttempt::Close(code)
            }
            None => AuthAttempt::Retry,
        }
    }

    pub(crate) async fn handle_toggle_ready(
        &self,
        user_id: UserId,
        room_id: RoomId,
    ) -> HandlerResult {
        let _guard = self.room_locks.lock(room_id).await;
        match self.repository.toggle_ready(room_id, user_id).await {
            Ok(snapshot) => {
                self.sync_room_cache(&snapshot).await;
                info!(%user_id, %room_id, status = ?snapshot.status, "Ready toggled");
                HandlerResult::room_update(room_id, snapshot)
            }
            Err(err) => HandlerResult::error(err.code(), err.to_string()),
        }
    }

    pub(crate) async fn handle_leave_room(
        &self,
        user_id: UserId,
        room_id: RoomId,
    ) -> HandlerResult {
        let outcome = {
            let _guard = self.room_locks.lock(room_id).await;
            match self.repository.leave_seat(room_id, user_id).await {
                Ok(outcome) => {
                    if outcome.room_closed {
                        self.drop_room_cache(&room_id).await;
                    } else {
                        self.sync_room_cache(&outcome.snapshot).await;
                    }
                    outcome
                }
                Err(err) => return HandlerResult::error(err.code(), err.to_string()),
            }
        };

        info!(%user_id, %room_id, room_closed = outcome.room_closed, "Seat vacated");

        if outcome.room_closed {
            self.sessions.remove(&room_id);
            self.room_locks.forget(&room_id);
            let closed = ServerMessage::RoomClosed {
                room_id,
                reason: RoomClosedReason::HostLeft,
            };
            HandlerResult {
                response: Some(closed.clone()),
                broadcast: Some(closed),
                room_id: Some(room_id),
                close: Some(close_codes::NORMAL),
            }
        } else {
            let mut result = HandlerResult::room_update(room_id, outcome.snapshot);
            result.close = Some(close_codes::NORMAL);
            result
        }
    }

    /// Teardown for one socket, from any path (client close, error, auth
    /// timeout, sweep, shutdown). Settles presence, seat liveness, and the
    /// host-departure rule.
    pub async fn disconnect_connection(&self, connection_id: &ConnectionId) {
        let Some(connection) = self.connections.remove(connection_id) else {
            return;
        };
        let Some(user_id) = connection.user_id else {
            debug!(%connection_id, "Unauthenticated connection closed");
            return;
        };
        if connection.authenticated {
            self.presence.on_disconnect(&user_id).await;
        }
        let Some(room_id) = connection.room_id else {
            return;
        };
        if self.connections.user_connections_in_room(&user_id, &room_id) > 0 {
            // The user still has another socket bound to this room.
            return;
        }

        let mut room_closed = false;
        let mut snapshot: Option<RoomSnapshot> = None;
        {
            let _guard = self.room_locks.lock(room_id).await;
            match self
                .repository
                .set_seat_connected(room_id, user_id, false)
                .await
            {
                Ok(updated) => {
                    let is_host = updated
                        .seat_of(&user_id)
                        .is_some_and(|seat| seat.is_host);
                    if is_host && updated.status.is_lobby() {
                        match self.repository.close_room(room_id).await {
                            Ok(closed) => {
                                room_closed = true;
                                snapshot = Some(closed);
                                self.drop_room_cache(&room_id).await;
                            }
                            Err(err) => {
                                warn!(%room_id, error = %err, "Failed to close room after host left");
                                self.sync_room_cache(&updated).await;
                                snapshot = Some(updated);
                            }
                        }
                    } else {
                        self.sync_room_cache(&updated).await;
                        snapshot = Some(updated);
                    }
                }
                Err(RepositoryError::NotInRoom | RepositoryError::RoomNotFound) => {
                    debug!(%user_id, %room_id, "No seat to settle on disconnect");
                }
                Err(err) => {
                    warn!(%user_id, %room_id, error = %err, "Failed to settle seat on disconnect");
                }
            }
        }

        if room_closed {
            self.sessions.remove(&room_id);
            self.room_locks.forget(&room_id);
            self.connections.send_to_room(
                &room_id,
                &Arc::new(ServerFrame::broadcast(ServerMessage::RoomClosed {
                    room_id,
                    reason: RoomClosedReason::HostLeft,
                })),
                None,
            );
            info!(%room_id, %user_id, "Room closed: host disconnected in lobby");
        } else if let Some(snapshot) = snapshot {
            self.connections.send_to_room(
                &room_id,
                &Arc::new(ServerFrame::broadcast(ServerMessage::RoomUpdated {
                    room: snapshot,
                })),
                None,
            );
        }

        info!(%connection_id, %user_id, instance_id = %self.server_id(), "Connection disconnected");
    }

    /// Best-effort denormalization of a snapshot into the cache hashes.
    /// Failures are logged and swallowed; the repository stays authoritative.
    pub(crate) async fn sync_room_cache(&self, snapshot: &RoomSnapshot) {
        let meta_key = format!("room:{}:meta", snapshot.room_id);
        let status = serde_json::to_value(snapshot.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let meta = [
            ("code", snapshot.code.clone()),
            ("status", status),
            ("max_players", snapshot.max_players.to_string()),
            ("ruleset_id", snapshot.ruleset_id.clone()),
            ("version", snapshot.version.to_string()),
        ];
        for (field, value) in meta {
            if let Err(err) = self.cache.hset(&meta_key, field, &value).await {
                warn!(room_id = %snapshot.room_id, field, error = %err, "Cache meta write failed");
                return;
            }
        }

        let seats_key = format!("room:{}:seats", snapshot.room_id);
        for seat in &snapshot.seats {
            let field = format!("seat:{}", seat.seat_index);
            match serde_json::to_string(seat) {
                Ok(json) => {
                    if let Err(err) = self.cache.hset(&seats_key, &field, &json).await {
                        warn!(room_id = %snapshot.room_id, %field, error = %err, "Cache seat write failed");
                        return;
                    }
                }
                Err(err) => {
                    warn!(room_id = %snapshot.room_id, %field, error = %err, "Seat serialization failed");
                }
            }
        }
    }

    /// Room cache keys carry no TTL; they are deleted when the room closes.
    pub(crate) async fn drop_room_cache(&self, room_id: &RoomId) {
        for key in [format!("room:{room_id}:meta"), format!("room:{room_id}:seats")] {
            if let Err(err) = self.cache.delete(&key).await {
                warn!(%room_id, %key, error = %err, "Cache delete failed");
            }
        }
    }
}
