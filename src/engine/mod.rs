//! Pure rules core for the stacked Ludo variant.
//!
//! The engine is a deterministic function over an inert [`GameState`]:
//! [`process_action`] consumes one action, draws any randomness from the
//! injected [`DiceRoller`], and returns the successor state plus the ordered
//! event list. Events are the only output clients ever observe.

pub mod board;
pub mod dice;
pub mod events;
pub mod moves;
pub mod process;
pub mod state;


pub use board::{Ruleset, HOMESTRETCH_LENGTH, ROAD_LENGTH, TOKENS_PER_PLAYER};
pub use dice::{DiceRoller, ScriptedDice, SeededDice, StdDice};
pub use events::{BonusReason, GameEvent};
pub use moves::{effective_roll, legal_moves, MoveOption};
pub use process::{initial_events, process_action, GameAction, GameError};
pub use state::{
    GameState, SeatIndex, Token, TokenId, TokenState, TrackPosition, TurnPhase,
};
