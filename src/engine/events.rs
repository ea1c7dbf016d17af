use serde::{Deserialize, Serialize};

use super::moves::MoveOption;
use super::state::{SeatIndex, TokenId, TrackPosition};

/// Why a bonus roll was granted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BonusReason {
    RolledSix,
    Capture,
}

/// Ordered, client-visible record of everything one action caused.
///
/// This set is fixed: clients render the game exclusively from these events
/// plus full-state snapshots on (re)join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    GameStarted {
        seats: Vec<SeatIndex>,
    },
    TurnStarted {
        seat: SeatIndex,
    },
    RollGranted {
        seat: SeatIndex,
    },
    DiceRolled {
        seat: SeatIndex,
        value: u8,
    },
    ThreeSixesPenalty {
        seat: SeatIndex,
    },
    NoLegalMoves {
        seat: SeatIndex,
        dice: Vec<u8>,
    },
    MoveRequested {
        seat: SeatIndex,
        options: Vec<MoveOption>,
    },
    TokenMoved {
        seat: SeatIndex,
        token_ids: Vec<TokenId>,
        die: u8,
        from: TrackPosition,
        to: TrackPosition,
    },
    StackSplit {
        seat: SeatIndex,
        moved: Vec<TokenId>,
        remaining: Vec<TokenId>,
    },
    StackMerged {
        seat: SeatIndex,
        token_ids: Vec<TokenId>,
        square: u8,
    },
    CaptureChoiceRequested {
        seat: SeatIndex,
        square: u8,
        owner_seats: Vec<SeatIndex>,
    },
    CaptureOccurred {
        seat: SeatIndex,
        owner_seat: SeatIndex,
        token_ids: Vec<TokenId>,
        square: u8,
    },
    TokenReachedHeaven {
        seat: SeatIndex,
        token_ids: Vec<TokenId>,
    },
    BonusRollGranted {
        seat: SeatIndex,
        reason: BonusReason,
    },
    TurnEnded {
        seat: SeatIndex,
    },
    GameEnded {
        rankings: Vec<SeatIndex>,
    },
}
