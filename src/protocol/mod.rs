//! Wire protocol: frame envelopes, message enums, error codes and snapshots.

pub mod error_codes;
pub mod messages;
pub mod room_codes;
pub mod types;

pub use error_codes::ErrorCode;

pub use messages::{
    ClientFrame, ClientMessage, GameActionPayload, RoomClosedReason, ServerFrame, ServerMessage,
};

pub use types::{
    close_codes, ConnectionId, ReadyStatus, RequestId, RoomId, RoomSnapshot, RoomStatus,
    RoomVisibility, SeatSnapshot, SeatStatus, UserId,
};
