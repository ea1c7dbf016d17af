use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{GameEvent, GameState, TokenId};

use super::error_codes::ErrorCode;
use super::types::{ConnectionId, RoomId, RoomSnapshot, UserId};

/// Envelope for frames sent by clients. The tagged message is flattened so
/// the wire shape is `{type, request_id?, payload?}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(flatten)]
    pub message: ClientMessage,
}

/// Message types sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a user and a room (MUST precede anything
    /// except `ping`)
    Authenticate { token: String, room_code: String },
    /// Heartbeat to maintain the connection
    Ping,
    /// Flip the ready flag on the sender's seat
    ToggleReady,
    /// Vacate the sender's seat
    LeaveRoom,
    /// Host-only: transition the room into game
    StartGame,
    /// Feed one action into the room's game engine
    GameAction(GameActionPayload),
}

/// Payload of a `game_action` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameActionPayload {
    Roll,
    Move { token_ids: Vec<TokenId>, die: u8 },
    CaptureChoice { owner_seat: u8 },
    /// Accepted as an alias for the top-level `start_game` frame
    StartGame,
}

/// Envelope for frames sent by the server. `request_id` echoes the client's
/// id on direct replies and is absent on broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(flatten)]
    pub message: ServerMessage,
}

impl ServerFrame {
    pub fn broadcast(message: ServerMessage) -> Self {
        Self {
            request_id: None,
            message,
        }
    }

    pub fn reply(request_id: Option<Uuid>, message: ServerMessage) -> Self {
        Self {
            request_id,
            message,
        }
    }
}

/// Reason attached to a `room_closed` broadcast.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomClosedReason {
    HostLeft,
}

/// Message types sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting sent immediately after the socket is accepted
    Connected {
        connection_id: ConnectionId,
        server_time: chrono::DateTime<chrono::Utc>,
    },
    /// Authentication handshake completed
    Authenticated {
        connection_id: ConnectionId,
        user_id: UserId,
        server_id: Uuid,
        room: RoomSnapshot,
    },
    /// Pong response to ping
    Pong {
        server_time: chrono::DateTime<chrono::Utc>,
    },
    /// Room state changed; carries the full snapshot for a redraw
    RoomUpdated { room: RoomSnapshot },
    /// Room was closed
    RoomClosed {
        room_id: RoomId,
        reason: RoomClosedReason,
    },
    /// The room transitioned into game
    GameStarted { room_id: RoomId, state: GameState },
    /// Ordered events produced by the game engine
    GameEvents {
        room_id: RoomId,
        events: Vec<GameEvent>,
    },
    /// Full game state snapshot (sent to rejoining members)
    GameState { room_id: RoomId, state: GameState },
    /// A game action was rejected; room state is unchanged
    GameError { code: ErrorCode, message: String },
    /// Generic error reply
    Error { code: ErrorCode, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: &ClientFrame) -> ClientFrame {
        let json = serde_json::to_string(frame).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn client_frame_wire_shape() {
        let frame = ClientFrame {
            request_id: Some(Uuid::new_v4()),
            message: ClientMessage::Authenticate {
                token: "jwt".to_string(),
                room_code: "AB12CD".to_string(),
            },
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "authenticate");
        assert_eq!(value["payload"]["room_code"], "AB12CD");
        assert!(value["request_id"].is_string());
    }

    #[test]
    fn unit_variants_omit_payload() {
        let json = serde_json::to_string(&ClientFrame {
            request_id: None,
            message: ClientMessage::Ping,
        })
        .unwrap();
        assert_eq!(json, "{\"type\":\"ping\"}");

        let parsed: ClientFrame = serde_json::from_str("{\"type\":\"toggle_ready\"}").unwrap();
        assert_eq!(parsed.message, ClientMessage::ToggleReady);
    }

    #[test]
    fn game_action_kinds() {
        let parsed: ClientFrame = serde_json::from_str(
            "{\"type\":\"game_action\",\"payload\":{\"kind\":\"move\",\"token_ids\":[4,5],\"die\":6}}",
        )
        .unwrap();
        assert_eq!(
            parsed.message,
            ClientMessage::GameAction(GameActionPayload::Move {
                token_ids: vec![4, 5],
                die: 6
            })
        );

        let parsed: ClientFrame =
            serde_json::from_str("{\"type\":\"game_action\",\"payload\":{\"kind\":\"roll\"}}")
                .unwrap();
        assert_eq!(
            parsed.message,
            ClientMessage::GameAction(GameActionPayload::Roll)
        );
    }

    #[test]
    fn decode_encode_roundtrip_preserves_frames() {
        let frames = vec![
            ClientFrame {
                request_id: Some(Uuid::new_v4()),
                message: ClientMessage::Authenticate {
                    token: "t".to_string(),
                    room_code: "ZZZZ99".to_string(),
                },
            },
            ClientFrame {
                request_id: None,
                message: ClientMessage::Ping,
            },
            ClientFrame {
                request_id: Some(Uuid::new_v4()),
                message: ClientMessage::GameAction(GameActionPayload::CaptureChoice {
                    owner_seat: 2,
                }),
            },
            ClientFrame {
                request_id: None,
                message: ClientMessage::LeaveRoom,
            },
        ];

        for frame in &frames {
            assert_eq!(&roundtrip(frame), frame);
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result: Result<ClientFrame, _> =
            serde_json::from_str("{\"type\":\"become_admin\"}");
        assert!(result.is_err());
    }

    #[test]
    fn server_error_frame_shape() {
        let frame = ServerFrame::broadcast(ServerMessage::Error {
            code: ErrorCode::Unauthenticated,
            message: "Authentication required".to_string(),
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["payload"]["code"], "UNAUTHENTICATED");
        assert!(value.get("request_id").is_none());
    }
}
