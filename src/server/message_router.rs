use std::sync::Arc;

use crate::protocol::{
    ClientFrame, ClientMessage, ConnectionId, ErrorCode, RoomId, RoomSnapshot, ServerFrame,
    ServerMessage,
};

use super::GameServer;

/// What a handler wants done on the network: an optional direct reply to
/// the originating connection, an optional broadcast to the rest of the
/// room, and optionally a close of the origin once both are queued.
#[derive(Debug, Clone, Default)]
pub struct HandlerResult {
    pub response: Option<ServerMessage>,
    pub broadcast: Option<ServerMessage>,
    pub room_id: Option<RoomId>,
    pub close: Option<u16>,
}

impl HandlerResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn reply(message: ServerMessage) -> Self {
        Self {
            response: Some(message),
            ..Self::default()
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::reply(ServerMessage::Error {
            code,
            message: message.into(),
        })
    }

    pub fn game_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::reply(ServerMessage::GameError {
            code,
            message: message.into(),
        })
    }

    /// Reply and broadcast the same fresh snapshot.
    pub fn room_update(room_id: RoomId, snapshot: RoomSnapshot) -> Self {
        Self {
            response: Some(ServerMessage::RoomUpdated {
                room: snapshot.clone(),
            }),
            broadcast: Some(ServerMessage::RoomUpdated { room: snapshot }),
            room_id: Some(room_id),
            close: None,
        }
    }
}

impl GameServer {
    /// Route one decoded frame. `ping` and `authenticate` are the only
    /// types allowed before authentication; everything else is guarded.
    pub async fn dispatch(&self, connection_id: &ConnectionId, frame: ClientFrame) {
        let request_id = frame.request_id;
        self.connections.record_seen(connection_id);

        let result = match frame.message {
            ClientMessage::Ping => self.handle_ping(),
            ClientMessage::Authenticate { .. } => {
                // The endpoint consumes authenticate frames itself; one
                // arriving here means the client re-authenticated a bound
                // connection.
                tracing::warn!(%connection_id, "Authenticate frame on an already bound connection");
                HandlerResult::error(
                    ErrorCode::ValidationError,
                    "connection is already authenticated",
                )
            }
            message => {
                let Some((user_id, room_id)) = self.connections.auth_context(connection_id)
                else {
                    self.connections.send_to_connection(
                        connection_id,
                        Arc::new(ServerFrame::reply(
                            request_id,
                            ServerMessage::Error {
                                code: ErrorCode::Unauthenticated,
                                message: ErrorCode::Unauthenticated.description().to_string(),
                            },
                        )),
                    );
                    return;
                };
                match message {
                    ClientMessage::ToggleReady => {
                        self.handle_toggle_ready(user_id, room_id).await
                    }
                    ClientMessage::LeaveRoom => self.handle_leave_room(user_id, room_id).await,
                    ClientMessage::StartGame => {
                        self.handle_start_game(connection_id, request_id, user_id, room_id)
                            .await
                    }
                    ClientMessage::GameAction(payload) => {
                        self.handle_game_action(connection_id, request_id, user_id, room_id, payload)
                            .await
                    }
                    ClientMessage::Ping | ClientMessage::Authenticate { .. } => {
                        HandlerResult::none()
                    }
                }
            }
        };

        if let Some(response) = result.response {
            self.connections.send_to_connection(
                connection_id,
                Arc::new(ServerFrame::reply(request_id, response)),
            );
        }
        if let (Some(broadcast), Some(room_id)) = (result.broadcast, result.room_id) {
            self.connections.send_to_room(
                &room_id,
                &Arc::new(ServerFrame::broadcast(broadcast)),
                Some(connection_id),
            );
        }
        if let Some(code) = result.close {
            self.connections.close(connection_id, code);
        }
    }
}
