use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::board::{Ruleset, ROAD_LENGTH, TOKENS_PER_PLAYER};

/// Seat number within the room, `0..max_players`.
pub type SeatIndex = u8;

/// Token identifier, stable for the lifetime of a game: `seat * 4 + k`.
pub type TokenId = u8;

/// The four stations of a token's journey.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenState {
    Hell,
    Road,
    Homestretch,
    Heaven,
}

/// Position on a concrete track, for events and move options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "track", rename_all = "snake_case")]
pub enum TrackPosition {
    Hell,
    Road { square: u8 },
    Homestretch { index: u8 },
    Heaven,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    pub id: TokenId,
    pub owner: SeatIndex,
    pub state: TokenState,
    /// Road square or homestretch index; meaningless in HELL and HEAVEN.
    pub position: u8,
    /// Other token ids stacked with this one. Stacked tokens always share
    /// owner, state and position, and move as a unit.
    pub stacked_with: BTreeSet<TokenId>,
}

impl Token {
    fn new(id: TokenId, owner: SeatIndex) -> Self {
        Self {
            id,
            owner,
            state: TokenState::Hell,
            position: 0,
            stacked_with: BTreeSet::new(),
        }
    }

    pub fn stack_height(&self) -> u8 {
        1 + self.stacked_with.len() as u8
    }

    pub fn track_position(&self) -> TrackPosition {
        match self.state {
            TokenState::Hell => TrackPosition::Hell,
            TokenState::Road => TrackPosition::Road {
                square: self.position,
            },
            TokenState::Homestretch => TrackPosition::Homestretch {
                index: self.position,
            },
            TokenState::Heaven => TrackPosition::Heaven,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    AwaitingRoll,
    AwaitingMove,
    AwaitingCaptureChoice,
    Finished,
}

/// Capture waiting on the mover to pick a target group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingCapture {
    pub square: u8,
    pub mover_ids: Vec<TokenId>,
    pub owner_seats: Vec<SeatIndex>,
}

/// Token layout snapshot taken at the start of each turn, restored when a
/// third consecutive six voids the whole turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnCheckpoint {
    pub tokens: Vec<Token>,
    pub finished: Vec<SeatIndex>,
}

/// Authoritative state of one running game. Mutated only through
/// [`process_action`](super::process_action).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameState {
    pub ruleset: Ruleset,
    /// Participating seats in play order.
    pub seats: Vec<SeatIndex>,
    /// Index into `seats` of the player whose turn it is.
    pub current: usize,
    pub phase: TurnPhase,
    /// Every die rolled this turn, in order.
    pub rolled: Vec<u8>,
    /// Rolled dice not yet consumed by a move.
    pub available_dice: Vec<u8>,
    pub consecutive_sixes: u8,
    pub tokens: Vec<Token>,
    /// Seats that have brought all four tokens home, in finishing order.
    pub finished: Vec<SeatIndex>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pending_capture: Option<PendingCapture>,
    #[serde(skip, default)]
    pub checkpoint: TurnCheckpoint,
}

impl GameState {
    /// Build the opening state: every token in HELL, first seat to act.
    pub fn new(seats: Vec<SeatIndex>, ruleset: Ruleset) -> Self {
        let tokens: Vec<Token> = seats
            .iter()
            .flat_map(|&seat| {
                (0..TOKENS_PER_PLAYER).map(move |k| Token::new(seat * TOKENS_PER_PLAYER + k, seat))
            })
            .collect();
        let checkpoint = TurnCheckpoint {
            tokens: tokens.clone(),
            finished: Vec::new(),
        };
        Self {
            ruleset,
            seats,
            current: 0,
            phase: TurnPhase::AwaitingRoll,
            rolled: Vec::new(),
            available_dice: Vec::new(),
            consecutive_sixes: 0,
            tokens,
            finished: Vec::new(),
            pending_capture: None,
            checkpoint,
        }
    }

    pub fn current_seat(&self) -> SeatIndex {
        self.seats.get(self.current).copied().unwrap_or(0)
    }

    pub fn token(&self, id: TokenId) -> Option<&Token> {
        self.tokens.iter().find(|t| t.id == id)
    }

    pub fn token_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        self.tokens.iter_mut().find(|t| t.id == id)
    }

    pub fn tokens_of(&self, seat: SeatIndex) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(move |t| t.owner == seat)
    }

    /// All member ids of the stack containing `id` (including `id`), sorted.
    pub fn stack_members(&self, id: TokenId) -> Vec<TokenId> {
        let mut members: Vec<TokenId> = self
            .token(id)
            .map(|t| {
                let mut ids: Vec<TokenId> = t.stacked_with.iter().copied().collect();
                ids.push(t.id);
                ids
            })
            .unwrap_or_default();
        members.sort_unstable();
        members
    }

    /// Tokens standing on a road square.
    pub fn road_occupants(&self, square: u8) -> Vec<&Token> {
        self.tokens
            .iter()
            .filter(|t| t.state == TokenState::Road && t.position == square)
            .collect()
    }

    /// Road steps already traveled from the owner's entry square.
    pub fn steps_traveled(&self, token: &Token) -> u8 {
        let start = self.ruleset.start_square(token.owner);
        (token.position + ROAD_LENGTH - start) % ROAD_LENGTH
    }

    pub fn is_finished(&self, seat: SeatIndex) -> bool {
        self.finished.contains(&seat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_game_puts_all_tokens_in_hell() {
        let state = GameState::new(vec![0, 1, 2], Ruleset::default());
        assert_eq!(state.tokens.len(), 12);
        assert!(state
            .tokens
            .iter()
            .all(|t| t.state == TokenState::Hell && t.stacked_with.is_empty()));
        assert_eq!(state.current_seat(), 0);
        assert_eq!(state.phase, TurnPhase::AwaitingRoll);
    }

    #[test]
    fn token_ids_encode_owner() {
        let state = GameState::new(vec![0, 2], Ruleset::default());
        assert_eq!(state.token(0).unwrap().owner, 0);
        assert_eq!(state.token(3).unwrap().owner, 0);
        assert_eq!(state.token(8).unwrap().owner, 2);
        assert!(state.token(4).is_none());
    }

    #[test]
    fn steps_traveled_wraps_around_the_loop() {
        let mut state = GameState::new(vec![0, 1], Ruleset::default());
        let token = state.token_mut(4).unwrap();
        token.state = TokenState::Road;
        token.position = 5;
        // Seat 1 starts at 13, so square 5 is 44 steps along.
        let token = state.token(4).unwrap();
        assert_eq!(state.steps_traveled(token), 44);
    }

    #[test]
    fn stack_members_includes_self_sorted() {
        let mut state = GameState::new(vec![0], Ruleset::default());
        state.token_mut(2).unwrap().stacked_with = BTreeSet::from([0, 3]);
        assert_eq!(state.stack_members(2), vec![0, 2, 3]);
        assert_eq!(state.stack_members(1), vec![1]);
    }

    #[test]
    fn wire_state_omits_checkpoint() {
        let state = GameState::new(vec![0, 1], Ruleset::default());
        let value = serde_json::to_value(&state).unwrap();
        assert!(value.get("checkpoint").is_none());
        assert!(value.get("tokens").is_some());
    }
}
