use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::board::{Ruleset, HOMESTRETCH_LENGTH, ROAD_LENGTH, ROAD_STEPS};
use super::process::GameError;
use super::state::{GameState, SeatIndex, TokenId, TokenState, TrackPosition};

/// One legal way to spend a die: the named tokens move as a unit to
/// `destination`. Subsets of a stack appear as separate options, which is
/// how split alternatives are offered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveOption {
    pub token_ids: Vec<TokenId>,
    pub die: u8,
    pub destination: TrackPosition,
}

/// A move that passed validation and is ready to apply.
#[derive(Debug, Clone)]
pub(super) struct ValidatedMove {
    pub token_ids: Vec<TokenId>,
    pub die: u8,
    pub destination: TrackPosition,
    /// Full membership of the stack the moved tokens came from.
    pub full_stack: Vec<TokenId>,
}

/// Where a unit lands after `steps` effective steps, or `None` when the
/// move is not possible (homestretch overshoot).
pub(super) fn advance(
    ruleset: &Ruleset,
    seat: SeatIndex,
    from: TrackPosition,
    steps: u8,
) -> Option<TrackPosition> {
    match from {
        TrackPosition::Hell => Some(TrackPosition::Road {
            square: ruleset.start_square(seat),
        }),
        TrackPosition::Road { square } => {
            let start = ruleset.start_square(seat);
            let traveled = (square + ROAD_LENGTH - start) % ROAD_LENGTH;
            let total = traveled + steps;
            if total <= ROAD_STEPS {
                Some(TrackPosition::Road {
                    square: (start + total) % ROAD_LENGTH,
                })
            } else {
                let lane = total - ROAD_STEPS;
                match lane.cmp(&HOMESTRETCH_LENGTH) {
                    std::cmp::Ordering::Less => Some(TrackPosition::Homestretch { index: lane }),
                    std::cmp::Ordering::Equal => Some(TrackPosition::Heaven),
                    std::cmp::Ordering::Greater => None,
                }
            }
        }
        TrackPosition::Homestretch { index } => {
            let lane = index + steps;
            match lane.cmp(&HOMESTRETCH_LENGTH) {
                std::cmp::Ordering::Less => Some(TrackPosition::Homestretch { index: lane }),
                std::cmp::Ordering::Equal => Some(TrackPosition::Heaven),
                std::cmp::Ordering::Greater => None,
            }
        }
        TrackPosition::Heaven => None,
    }
}

/// Distance a stack moves for a raw die: `floor(raw / height)`.
pub fn effective_roll(raw: u8, height: u8) -> u8 {
    if height == 0 {
        0
    } else {
        raw / height
    }
}

/// Movement units for one seat: each HELL token by itself, each board stack
/// once (represented by its sorted member list).
fn units_of(state: &GameState, seat: SeatIndex) -> Vec<Vec<TokenId>> {
    let mut units = Vec::new();
    let mut seen: BTreeSet<TokenId> = BTreeSet::new();
    for token in state.tokens_of(seat) {
        match token.state {
            TokenState::Heaven => {}
            TokenState::Hell => units.push(vec![token.id]),
            TokenState::Road | TokenState::Homestretch => {
                if seen.contains(&token.id) {
                    continue;
                }
                let members = state.stack_members(token.id);
                seen.extend(members.iter().copied());
                units.push(members);
            }
        }
    }
    units
}

/// Enumerate every legal move for the current player across the dice still
/// available this turn. Empty result means the turn cannot continue.
pub fn legal_moves(state: &GameState) -> Vec<MoveOption> {
    let seat = state.current_seat();
    let mut dice: Vec<u8> = state.available_dice.clone();
    dice.sort_unstable();
    dice.dedup();

    let mut options = Vec::new();
    for unit in units_of(state, seat) {
        let Some(first) = unit.first().and_then(|&id| state.token(id)) else {
            continue;
        };
        for &die in &dice {
            if first.state == TokenState::Hell {
                // Leaving HELL takes a raw six; stack arithmetic never applies.
                if die == 6 {
                    options.push(MoveOption {
                        token_ids: unit.clone(),
                        die,
                        destination: TrackPosition::Road {
                            square: state.ruleset.start_square(seat),
                        },
                    });
                }
                continue;
            }
            // Offer the whole stack and every non-trivial subset that can
            // still move: subsets of equal size are equivalent, so one
            // canonical prefix per size is enough.
            for size in 1..=unit.len() {
                let steps = effective_roll(die, size as u8);
                if steps == 0 {
                    continue;
                }
                let Some(destination) =
                    advance(&state.ruleset, seat, first.track_position(), steps)
                else {
                    continue;
                };
                options.push(MoveOption {
                    token_ids: unit.iter().copied().take(size).collect(),
                    die,
                    destination,
                });
            }
        }
    }
    options
}

/// Validate a client-declared move against the current state.
pub(super) fn validate_move(
    state: &GameState,
    token_ids: &[TokenId],
    die: u8,
) -> Result<ValidatedMove, GameError> {
    if !state.available_dice.contains(&die) {
        return Err(GameError::IllegalMove(format!(
            "die {die} is not available this turn"
        )));
    }

    let mut ids: Vec<TokenId> = token_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Err(GameError::IllegalMove("no tokens named".to_string()));
    }

    let seat = state.current_seat();
    let first = state
        .token(ids[0])
        .ok_or_else(|| GameError::IllegalMove(format!("unknown token {}", ids[0])))?;
    if first.owner != seat {
        return Err(GameError::IllegalMove(
            "token belongs to another player".to_string(),
        ));
    }

    match first.state {
        TokenState::Heaven => Err(GameError::IllegalMove(
            "token is frozen in heaven".to_string(),
        )),
        TokenState::Hell => {
            if ids.len() != 1 {
                return Err(GameError::IllegalMove(
                    "tokens in hell move one at a time".to_string(),
                ));
            }
            if die != 6 {
                return Err(GameError::IllegalMove(
                    "leaving hell requires a raw six".to_string(),
                ));
            }
            Ok(ValidatedMove {
                destination: TrackPosition::Road {
                    square: state.ruleset.start_square(seat),
                },
                full_stack: ids.clone(),
                token_ids: ids,
                die,
            })
        }
        TokenState::Road | TokenState::Homestretch => {
            let full_stack = state.stack_members(first.id);
            if !ids.iter().all(|id| full_stack.contains(id)) {
                return Err(GameError::IllegalMove(
                    "tokens are not part of one stack".to_string(),
                ));
            }
            let steps = effective_roll(die, ids.len() as u8);
            if steps == 0 {
                return Err(GameError::IllegalMove(format!(
                    "stack of {} cannot move with a {die}",
                    ids.len()
                )));
            }
            let destination = advance(&state.ruleset, seat, first.track_position(), steps)
                .ok_or_else(|| {
                    GameError::IllegalMove("move overshoots the homestretch".to_string())
                })?;
            Ok(ValidatedMove {
                token_ids: ids,
                die,
                destination,
                full_stack,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::TurnPhase;

    fn state_with_dice(dice: &[u8]) -> GameState {
        let mut state = GameState::new(vec![0, 1], Ruleset::default());
        state.available_dice = dice.to_vec();
        state.phase = TurnPhase::AwaitingMove;
        state
    }

    fn place_on_road(state: &mut GameState, id: TokenId, square: u8) {
        let token = state.token_mut(id).unwrap();
        token.state = TokenState::Road;
        token.position = square;
    }

    fn stack(state: &mut GameState, ids: &[TokenId]) {
        let all: BTreeSet<TokenId> = ids.iter().copied().collect();
        for &id in ids {
            let mut others = all.clone();
            others.remove(&id);
            state.token_mut(id).unwrap().stacked_with = others;
        }
    }

    #[test]
    fn effective_roll_is_floor_division() {
        assert_eq!(effective_roll(5, 2), 2);
        assert_eq!(effective_roll(3, 2), 1);
        assert_eq!(effective_roll(1, 2), 0);
        assert_eq!(effective_roll(6, 1), 6);
        assert_eq!(effective_roll(6, 4), 1);
    }

    #[test]
    fn hell_tokens_need_a_raw_six() {
        let state = state_with_dice(&[5]);
        assert!(legal_moves(&state).is_empty());

        let state = state_with_dice(&[6]);
        let options = legal_moves(&state);
        assert_eq!(options.len(), 4);
        assert!(options
            .iter()
            .all(|o| o.destination == TrackPosition::Road { square: 0 }));
    }

    #[test]
    fn stack_subsets_are_offered_as_splits() {
        let mut state = state_with_dice(&[5]);
        place_on_road(&mut state, 0, 10);
        place_on_road(&mut state, 1, 10);
        stack(&mut state, &[0, 1]);
        // Other two tokens stay in hell (no six available).
        let options = legal_moves(&state);
        // size 1 -> effective 5, size 2 -> effective 2
        assert_eq!(options.len(), 2);
        assert!(options.contains(&MoveOption {
            token_ids: vec![0],
            die: 5,
            destination: TrackPosition::Road { square: 15 },
        }));
        assert!(options.contains(&MoveOption {
            token_ids: vec![0, 1],
            die: 5,
            destination: TrackPosition::Road { square: 12 },
        }));
    }

    #[test]
    fn tall_stack_cannot_move_on_a_small_die() {
        let mut state = state_with_dice(&[1]);
        place_on_road(&mut state, 0, 10);
        place_on_road(&mut state, 1, 10);
        stack(&mut state, &[0, 1]);
        let options = legal_moves(&state);
        // Only the single-token split can move on a one.
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].token_ids, vec![0]);
    }

    #[test]
    fn homestretch_overshoot_is_not_offered() {
        let mut state = state_with_dice(&[4]);
        let token = state.token_mut(0).unwrap();
        token.state = TokenState::Homestretch;
        token.position = 4;
        assert!(legal_moves(&state).is_empty());

        let mut state = state_with_dice(&[2]);
        let token = state.token_mut(0).unwrap();
        token.state = TokenState::Homestretch;
        token.position = 4;
        let options = legal_moves(&state);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].destination, TrackPosition::Heaven);
    }

    #[test]
    fn road_advance_enters_homestretch_after_full_loop() {
        let ruleset = Ruleset::default();
        // Seat 0 enters at 0; square 49 is 49 steps along.
        assert_eq!(
            advance(&ruleset, 0, TrackPosition::Road { square: 49 }, 2),
            Some(TrackPosition::Road { square: 51 })
        );
        assert_eq!(
            advance(&ruleset, 0, TrackPosition::Road { square: 49 }, 3),
            Some(TrackPosition::Homestretch { index: 1 })
        );
        assert_eq!(
            advance(&ruleset, 0, TrackPosition::Road { square: 51 }, 6),
            Some(TrackPosition::Heaven)
        );
        assert_eq!(
            advance(&ruleset, 0, TrackPosition::Road { square: 51 }, 7),
            None
        );
    }

    #[test]
    fn validate_rejects_foreign_and_mixed_tokens() {
        let mut state = state_with_dice(&[3]);
        place_on_road(&mut state, 0, 10);
        place_on_road(&mut state, 4, 10);

        let err = validate_move(&state, &[4], 3).unwrap_err();
        assert!(matches!(err, GameError::IllegalMove(_)));

        // Tokens 0 and 1 are not stacked together.
        place_on_road(&mut state, 1, 20);
        let err = validate_move(&state, &[0, 1], 3).unwrap_err();
        assert!(matches!(err, GameError::IllegalMove(_)));
    }

    #[test]
    fn validate_rejects_unavailable_die() {
        let mut state = state_with_dice(&[3]);
        place_on_road(&mut state, 0, 10);
        let err = validate_move(&state, &[0], 5).unwrap_err();
        assert!(matches!(err, GameError::IllegalMove(_)));
    }
}
