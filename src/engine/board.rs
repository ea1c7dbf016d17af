use serde::{Deserialize, Serialize};

/// Squares on the shared loop.
pub const ROAD_LENGTH: u8 = 52;

/// Squares in each player's private lane; landing exactly on the last one
/// reaches HEAVEN.
pub const HOMESTRETCH_LENGTH: u8 = 6;

/// Tokens per player.
pub const TOKENS_PER_PLAYER: u8 = 4;

/// Road steps a token travels before its home entry: the full loop.
pub const ROAD_STEPS: u8 = ROAD_LENGTH - 1;

fn default_start_squares() -> [u8; 4] {
    [0, 13, 26, 39]
}

fn default_shared_safe_squares() -> Vec<u8> {
    vec![8, 21, 34, 47]
}

fn default_end_on_first_finish() -> bool {
    true
}

/// Per-room rule configuration. Deserialized from the room's ruleset-config
/// blob; unspecified fields fall back to the classic board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ruleset {
    /// Entry square on the road for each seat.
    #[serde(default = "default_start_squares")]
    pub start_squares: [u8; 4],
    /// Capture-free squares shared by all players, in addition to every
    /// seat's entry square.
    #[serde(default = "default_shared_safe_squares")]
    pub shared_safe_squares: Vec<u8>,
    /// When multiple distinct opponent groups share the landing square,
    /// require the mover to pick one instead of capturing all of them.
    #[serde(default)]
    pub capture_choice: bool,
    /// End the game as soon as one player gets all four tokens home;
    /// otherwise play continues until all but one have finished.
    #[serde(default = "default_end_on_first_finish")]
    pub end_on_first_finish: bool,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self {
            start_squares: default_start_squares(),
            shared_safe_squares: default_shared_safe_squares(),
            capture_choice: false,
            end_on_first_finish: true,
        }
    }
}

impl Ruleset {
    /// Parse a ruleset-config blob, falling back to defaults on any field
    /// the blob omits. A malformed blob yields the default board.
    pub fn from_config(config: &serde_json::Value) -> Self {
        serde_json::from_value(config.clone()).unwrap_or_default()
    }

    pub fn start_square(&self, seat: u8) -> u8 {
        self.start_squares
            .get(seat as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Home-entry square: the last road square before the private lane,
    /// one short of a full loop from the seat's entry.
    pub fn home_entry(&self, seat: u8) -> u8 {
        (self.start_square(seat) + ROAD_STEPS) % ROAD_LENGTH
    }

    /// Captures never happen on safe squares: every seat's entry square
    /// plus the configured shared set.
    pub fn is_safe(&self, square: u8) -> bool {
        self.start_squares.contains(&square) || self.shared_safe_squares.contains(&square)
    }
}
