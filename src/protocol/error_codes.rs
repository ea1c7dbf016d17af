use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error codes for structured error handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Frame / payload validation
    ValidationError,
    InvalidMessage,

    // Authentication
    Unauthenticated,
    AuthFailed,
    AuthExpired,
    AuthTimeout,

    // Room lifecycle
    RoomNotFound,
    RoomAccessDenied,
    RoomClosed,
    RoomInGame,
    RoomFull,
    RequestInProgress,
    CodeGenerationFailed,
    NotInRoom,
    NotHost,

    // Game engine
    BadPhase,
    IllegalMove,

    // Server
    InternalError,
}

impl ErrorCode {
    /// Human-readable description suitable for client display and debugging.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ValidationError => "The frame payload is invalid or malformed.",
            Self::InvalidMessage => "The message type is not recognized by this server.",
            Self::Unauthenticated => {
                "This operation requires an authenticated connection. Send `authenticate` first."
            }
            Self::AuthFailed => "The bearer token is invalid or its signature could not be verified.",
            Self::AuthExpired => "The bearer token has expired. Obtain a new token and retry.",
            Self::AuthTimeout => "Authentication did not complete within the allowed window.",
            Self::RoomNotFound => {
                "No room matches that code. It may have been closed or the code is mistyped."
            }
            Self::RoomAccessDenied => "You do not have a seat in this room.",
            Self::RoomClosed => "The room has been closed and can no longer be joined.",
            Self::RoomInGame => "The room is already in game; only seated members may rejoin.",
            Self::RoomFull => "Every seat in the room is taken.",
            Self::RequestInProgress => {
                "A request with this id is still being processed. Retry shortly."
            }
            Self::CodeGenerationFailed => {
                "A unique room code could not be allocated. Please try again."
            }
            Self::NotInRoom => "You are not seated in any room.",
            Self::NotHost => "Only the room host may perform this operation.",
            Self::BadPhase => "The game is not in a phase where that action is allowed.",
            Self::IllegalMove => "That move is not legal in the current game state.",
            Self::InternalError => "An internal server error occurred. Please try again.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
