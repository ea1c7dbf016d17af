//! Persistent room and seat state.
//!
//! The trait mirrors the SQL contract (`rooms`, `room_seats`,
//! `ws_idempotency` with optimistic locking on `version`); the in-memory
//! backend implements the same observable semantics and is the one
//! compiled in here.

pub mod memory;

pub use memory::InMemoryRoomRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{
    ErrorCode, ReadyStatus, RequestId, RoomId, RoomSnapshot, RoomStatus, RoomVisibility,
    SeatSnapshot, SeatStatus, UserId,
};

/// Parameters for room creation.
#[derive(Debug, Clone)]
pub struct CreateRoomParams {
    pub max_players: u8,
    pub visibility: RoomVisibility,
    pub ruleset_id: String,
    pub ruleset_config: serde_json::Value,
}

impl Default for CreateRoomParams {
    fn default() -> Self {
        Self {
            max_players: 4,
            visibility: RoomVisibility::Private,
            ruleset_id: "stacked-ludo".to_string(),
            ruleset_config: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Canonical reply for a `find_or_create` call; stored verbatim in the
/// idempotency table so retries read back the identical payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedRoom {
    pub room_id: RoomId,
    pub code: String,
    pub seat_index: u8,
    pub is_host: bool,
    pub cached: bool,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub seat_index: u8,
    pub snapshot: RoomSnapshot,
}

#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub snapshot: RoomSnapshot,
    pub room_closed: bool,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RepositoryError {
    #[error("room not found")]
    RoomNotFound,
    #[error("room is closed")]
    RoomClosed,
    #[error("room is full")]
    RoomFull,
    #[error("room is in game and the user holds no seat")]
    RoomInGame,
    #[error("user has no seat in this room")]
    NotInRoom,
    #[error("user is not the host")]
    NotHost,
    #[error("operation not allowed while room is {0:?}")]
    BadStatus(RoomStatus),
    #[error("request is still in progress")]
    RequestInProgress,
    #[error("could not allocate a unique room code")]
    CodeGenerationFailed,
    #[error("version conflict retries exhausted")]
    Conflict,
    #[error("invalid parameters: {0}")]
    Invalid(String),
}

impl RepositoryError {
    /// Wire error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RoomNotFound => ErrorCode::RoomNotFound,
            Self::RoomClosed | Self::BadStatus(RoomStatus::Closed) => ErrorCode::RoomClosed,
            Self::RoomFull => ErrorCode::RoomFull,
            Self::RoomInGame | Self::BadStatus(RoomStatus::InGame) => ErrorCode::RoomInGame,
            Self::NotInRoom => ErrorCode::NotInRoom,
            Self::NotHost => ErrorCode::NotHost,
            Self::BadStatus(_) => ErrorCode::BadPhase,
            Self::RequestInProgress => ErrorCode::RequestInProgress,
            Self::CodeGenerationFailed => ErrorCode::CodeGenerationFailed,
            Self::Conflict => ErrorCode::InternalError,
            Self::Invalid(_) => ErrorCode::ValidationError,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatRecord {
    pub seat_index: u8,
    pub user_id: Option<UserId>,
    pub display_name: Option<String>,
    pub is_host: bool,
    pub ready: ReadyStatus,
    pub connected: bool,
    pub status: SeatStatus,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
}

impl SeatRecord {
    fn empty(seat_index: u8) -> Self {
        Self {
            seat_index,
            user_id: None,
            display_name: None,
            is_host: false,
            ready: ReadyStatus::NotReady,
            connected: false,
            status: SeatStatus::Empty,
            joined_at: None,
            left_at: None,
        }
    }

    fn snapshot(&self) -> SeatSnapshot {
        SeatSnapshot {
            seat_index: self.seat_index,
            user_id: self.user_id,
            display_name: self.display_name.clone(),
            ready: self.ready,
            connected: self.connected,
            is_host: self.is_host,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomRecord {
    pub id: RoomId,
    pub code: String,
    pub owner_id: UserId,
    pub status: RoomStatus,
    pub visibility: RoomVisibility,
    pub max_players: u8,
    pub ruleset_id: String,
    pub ruleset_config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub seats: Vec<SeatRecord>,
}

impl RoomRecord {
    pub fn seat_of(&self, user_id: &UserId) -> Option<&SeatRecord> {
        self.seats.iter().find(|s| s.user_id == Some(*user_id))
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id,
            code: self.code.clone(),
            status: self.status,
            visibility: self.visibility,
            ruleset_id: self.ruleset_id.clone(),
            max_players: self.max_players,
            seats: self.seats.iter().map(SeatRecord::snapshot).collect(),
            version: self.version,
        }
    }
}

/// Persistent room operations.
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Idempotent room creation. A replayed `request_id` returns the stored
    /// reply with `cached=true`; a user who already owns an open room gets
    /// that room back instead of a new one.
    async fn find_or_create(
        &self,
        user_id: UserId,
        request_id: RequestId,
        params: CreateRoomParams,
    ) -> Result<CreatedRoom, RepositoryError>;

    /// Case-insensitive code lookup among non-closed rooms.
    async fn resolve_by_code(&self, code: &str) -> Result<RoomRecord, RepositoryError>;

    async fn get_room(&self, room_id: RoomId) -> Result<RoomRecord, RepositoryError>;

    /// Seat the user on the lowest free seat; rejoin is idempotent.
    async fn join_seat(
        &self,
        room_id: RoomId,
        user_id: UserId,
        display_name: Option<&str>,
    ) -> Result<JoinOutcome, RepositoryError>;

    /// Flip the user's ready flag, maintaining the room-status invariant:
    /// `ready_to_start` iff at least two occupied seats and all ready.
    async fn toggle_ready(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<RoomSnapshot, RepositoryError>;

    /// Vacate the user's seat. A host leaving a lobby closes the room;
    /// otherwise the host flag moves to the lowest occupied seat.
    async fn leave_seat(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<LeaveOutcome, RepositoryError>;

    /// Track socket liveness on the seat; disconnecting also clears ready.
    async fn set_seat_connected(
        &self,
        room_id: RoomId,
        user_id: UserId,
        connected: bool,
    ) -> Result<RoomSnapshot, RepositoryError>;

    /// Host-only transition `ready_to_start -> in_game`.
    async fn start_game(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<RoomSnapshot, RepositoryError>;

    async fn close_room(&self, room_id: RoomId) -> Result<RoomSnapshot, RepositoryError>;

    async fn get_snapshot(&self, room_id: RoomId) -> Result<RoomSnapshot, RepositoryError>;
}
