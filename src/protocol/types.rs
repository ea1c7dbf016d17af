use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of an authenticated user (subject of their bearer token).
pub type UserId = Uuid;

/// Stable opaque identifier of a room.
pub type RoomId = Uuid;

/// Identifier assigned to a live socket on accept.
pub type ConnectionId = Uuid;

/// Client-supplied idempotency key for at-most-once operations.
pub type RequestId = Uuid;

/// Room lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Open,
    ReadyToStart,
    InGame,
    Closed,
}

impl RoomStatus {
    /// Lobby states: the room has not started a game and is not closed.
    pub fn is_lobby(self) -> bool {
        matches!(self, Self::Open | Self::ReadyToStart)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomVisibility {
    Private,
    Public,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadyStatus {
    NotReady,
    Ready,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Empty,
    Occupied,
    Left,
}

/// Complete, authoritative description of a room suitable for a full client
/// redraw. Seats are always present for indices `0..max_players`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub code: String,
    pub status: RoomStatus,
    pub visibility: RoomVisibility,
    pub ruleset_id: String,
    pub max_players: u8,
    pub seats: Vec<SeatSnapshot>,
    pub version: i64,
}

impl RoomSnapshot {
    pub fn seat_of(&self, user_id: &UserId) -> Option<&SeatSnapshot> {
        self.seats.iter().find(|s| s.user_id == Some(*user_id))
    }

    pub fn occupied_seats(&self) -> impl Iterator<Item = &SeatSnapshot> {
        self.seats.iter().filter(|s| s.user_id.is_some())
    }

    pub fn host_seat(&self) -> Option<&SeatSnapshot> {
        self.seats.iter().find(|s| s.is_host)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatSnapshot {
    pub seat_index: u8,
    pub user_id: Option<UserId>,
    pub display_name: Option<String>,
    pub ready: ReadyStatus,
    pub connected: bool,
    pub is_host: bool,
}

/// WebSocket close codes used by the endpoint.
pub mod close_codes {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const INVALID_DATA: u16 = 1007;
    pub const AUTH_FAILED: u16 = 4001;
    pub const AUTH_EXPIRED: u16 = 4002;
    pub const ROOM_NOT_FOUND: u16 = 4003;
    pub const ROOM_ACCESS_DENIED: u16 = 4004;
    pub const AUTH_TIMEOUT: u16 = 4005;
}
