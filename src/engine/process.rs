use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use super::dice::DiceRoller;
use super::events::{BonusReason, GameEvent};
use super::moves::{legal_moves, validate_move, ValidatedMove};
use super::state::{
    GameState, PendingCapture, SeatIndex, TokenId, TokenState, TrackPosition, TurnCheckpoint,
    TurnPhase,
};

/// One player action fed into the engine. `seat` is the acting player as
/// resolved by the session layer; the engine rejects out-of-turn actors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameAction {
    Roll {
        seat: SeatIndex,
    },
    Move {
        seat: SeatIndex,
        token_ids: Vec<TokenId>,
        die: u8,
    },
    CaptureChoice {
        seat: SeatIndex,
        owner_seat: SeatIndex,
    },
}

impl GameAction {
    pub fn seat(&self) -> SeatIndex {
        match self {
            Self::Roll { seat } | Self::CaptureChoice { seat, .. } | Self::Move { seat, .. } => {
                *seat
            }
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum GameError {
    #[error("action not allowed in phase {0:?}")]
    BadPhase(TurnPhase),
    #[error("it is not this seat's turn")]
    NotYourTurn,
    #[error("illegal move: {0}")]
    IllegalMove(String),
}

/// Events describing a freshly built game: emitted once when the room
/// transitions into game, before any action is processed.
pub fn initial_events(state: &GameState) -> Vec<GameEvent> {
    let seat = state.current_seat();
    vec![
        GameEvent::GameStarted {
            seats: state.seats.clone(),
        },
        GameEvent::TurnStarted { seat },
        GameEvent::RollGranted { seat },
    ]
}

/// Apply one action to `state`, drawing randomness from `roller`.
///
/// Pure with respect to its inputs: the given state is never mutated, and
/// identical `(state, action, roller)` triples produce identical results.
/// On error the action is rejected and no successor state exists.
pub fn process_action(
    state: &GameState,
    action: &GameAction,
    roller: &mut dyn DiceRoller,
) -> Result<(GameState, Vec<GameEvent>), GameError> {
    if state.phase == TurnPhase::Finished {
        return Err(GameError::BadPhase(TurnPhase::Finished));
    }
    if action.seat() != state.current_seat() {
        return Err(GameError::NotYourTurn);
    }

    let mut st = state.clone();
    let mut events = Vec::new();

    match action {
        GameAction::Roll { .. } => {
            if st.phase != TurnPhase::AwaitingRoll {
                return Err(GameError::BadPhase(st.phase));
            }
            let seat = st.current_seat();
            let value = roller.roll();
            st.rolled.push(value);
            events.push(GameEvent::DiceRolled { seat, value });

            if value == 6 {
                st.consecutive_sixes += 1;
                if st.consecutive_sixes >= 3 {
                    // The whole turn is void: restore the checkpoint so
                    // nothing rolled this turn has any net effect.
                    st.tokens = st.checkpoint.tokens.clone();
                    st.finished = st.checkpoint.finished.clone();
                    st.available_dice.clear();
                    st.pending_capture = None;
                    events.push(GameEvent::ThreeSixesPenalty { seat });
                    end_turn(&mut st, &mut events);
                } else {
                    st.available_dice.push(value);
                    events.push(GameEvent::BonusRollGranted {
                        seat,
                        reason: BonusReason::RolledSix,
                    });
                    // Stay in awaiting_roll: the bonus die is thrown before
                    // any movement resolves.
                }
            } else {
                st.consecutive_sixes = 0;
                st.available_dice.push(value);
                resolve_available_dice(&mut st, &mut events);
            }
        }
        GameAction::Move { token_ids, die, .. } => {
            if st.phase != TurnPhase::AwaitingMove {
                return Err(GameError::BadPhase(st.phase));
            }
            let validated = validate_move(&st, token_ids, *die)?;
            let outcome = apply_move(&mut st, &mut events, validated);
            after_move(&mut st, &mut events, outcome);
        }
        GameAction::CaptureChoice { owner_seat, .. } => {
            if st.phase != TurnPhase::AwaitingCaptureChoice {
                return Err(GameError::BadPhase(st.phase));
            }
            let pending = st
                .pending_capture
                .clone()
                .ok_or(GameError::BadPhase(TurnPhase::AwaitingCaptureChoice))?;
            if !pending.owner_seats.contains(owner_seat) {
                return Err(GameError::IllegalMove(format!(
                    "seat {owner_seat} is not a capture target"
                )));
            }
            st.pending_capture = None;
            let seat = st.current_seat();
            capture_group(&mut st, &mut events, seat, *owner_seat, pending.square);
            merge_own(&mut st, &mut events, seat, pending.square);
            events.push(GameEvent::BonusRollGranted {
                seat,
                reason: BonusReason::Capture,
            });
            st.phase = TurnPhase::AwaitingRoll;
        }
    }

    Ok((st, events))
}

struct MoveOutcome {
    captured: bool,
    awaiting_choice: bool,
}

fn after_move(st: &mut GameState, events: &mut Vec<GameEvent>, outcome: MoveOutcome) {
    if st.phase == TurnPhase::Finished {
        return;
    }
    if outcome.awaiting_choice {
        st.phase = TurnPhase::AwaitingCaptureChoice;
        return;
    }
    if outcome.captured {
        events.push(GameEvent::BonusRollGranted {
            seat: st.current_seat(),
            reason: BonusReason::Capture,
        });
        st.phase = TurnPhase::AwaitingRoll;
        return;
    }
    resolve_available_dice(st, events);
}

/// Drive the turn forward with the dice currently on the table: end the
/// turn when nothing can move, auto-apply a forced move, or hand control
/// to the player when there is a real choice.
fn resolve_available_dice(st: &mut GameState, events: &mut Vec<GameEvent>) {
    loop {
        if st.phase == TurnPhase::Finished {
            return;
        }
        if st.available_dice.is_empty() {
            end_turn(st, events);
            return;
        }
        let options = legal_moves(st);
        if options.is_empty() {
            events.push(GameEvent::NoLegalMoves {
                seat: st.current_seat(),
                dice: st.available_dice.clone(),
            });
            st.available_dice.clear();
            end_turn(st, events);
            return;
        }
        if options.len() == 1 {
            // Forced move: apply without asking.
            let only = &options[0];
            let Ok(validated) = validate_move(st, &only.token_ids, only.die) else {
                end_turn(st, events);
                return;
            };
            let outcome = apply_move(st, events, validated);
            if st.phase == TurnPhase::Finished {
                return;
            }
            if outcome.awaiting_choice {
                st.phase = TurnPhase::AwaitingCaptureChoice;
                return;
            }
            if outcome.captured {
                events.push(GameEvent::BonusRollGranted {
                    seat: st.current_seat(),
                    reason: BonusReason::Capture,
                });
                st.phase = TurnPhase::AwaitingRoll;
                return;
            }
            continue;
        }
        st.phase = TurnPhase::AwaitingMove;
        events.push(GameEvent::MoveRequested {
            seat: st.current_seat(),
            options,
        });
        return;
    }
}

fn apply_move(st: &mut GameState, events: &mut Vec<GameEvent>, mv: ValidatedMove) -> MoveOutcome {
    let seat = st.current_seat();
    let from = st
        .token(mv.token_ids[0])
        .map(|t| t.track_position())
        .unwrap_or(TrackPosition::Hell);

    consume_die(st, mv.die);

    if mv.token_ids.len() < mv.full_stack.len() {
        let remaining: Vec<TokenId> = mv
            .full_stack
            .iter()
            .copied()
            .filter(|id| !mv.token_ids.contains(id))
            .collect();
        events.push(GameEvent::StackSplit {
            seat,
            moved: mv.token_ids.clone(),
            remaining: remaining.clone(),
        });
        set_stack(st, &remaining);
    }

    move_unit(st, &mv.token_ids, mv.destination);
    events.push(GameEvent::TokenMoved {
        seat,
        token_ids: mv.token_ids.clone(),
        die: mv.die,
        from,
        to: mv.destination,
    });

    let mut outcome = MoveOutcome {
        captured: false,
        awaiting_choice: false,
    };

    match mv.destination {
        TrackPosition::Heaven => {
            events.push(GameEvent::TokenReachedHeaven {
                seat,
                token_ids: mv.token_ids.clone(),
            });
            check_finish(st, events, seat);
        }
        TrackPosition::Homestretch { index } => {
            merge_homestretch(st, events, seat, index, &mv.token_ids);
        }
        TrackPosition::Road { square } => {
            if !st.ruleset.is_safe(square) {
                let groups = opponent_groups(st, seat, square);
                if !groups.is_empty() {
                    if st.ruleset.capture_choice && groups.len() > 1 {
                        st.pending_capture = Some(PendingCapture {
                            square,
                            mover_ids: mv.token_ids.clone(),
                            owner_seats: groups.keys().copied().collect(),
                        });
                        events.push(GameEvent::CaptureChoiceRequested {
                            seat,
                            square,
                            owner_seats: groups.keys().copied().collect(),
                        });
                        outcome.awaiting_choice = true;
                        return outcome;
                    }
                    for owner in groups.keys() {
                        capture_group(st, events, seat, *owner, square);
                    }
                    outcome.captured = true;
                }
                merge_own(st, events, seat, square);
            }
        }
        TrackPosition::Hell => {}
    }

    outcome
}

/// Opponent tokens standing on a road square, grouped by owner. BTreeMap
/// keeps group order deterministic.
fn opponent_groups(
    st: &GameState,
    seat: SeatIndex,
    square: u8,
) -> BTreeMap<SeatIndex, Vec<TokenId>> {
    let mut groups: BTreeMap<SeatIndex, Vec<TokenId>> = BTreeMap::new();
    for token in st.road_occupants(square) {
        if token.owner != seat {
            groups.entry(token.owner).or_default().push(token.id);
        }
    }
    groups
}

fn capture_group(
    st: &mut GameState,
    events: &mut Vec<GameEvent>,
    seat: SeatIndex,
    owner: SeatIndex,
    square: u8,
) {
    let mut captured: Vec<TokenId> = st
        .road_occupants(square)
        .into_iter()
        .filter(|t| t.owner == owner)
        .map(|t| t.id)
        .collect();
    captured.sort_unstable();
    for &id in &captured {
        if let Some(token) = st.token_mut(id) {
            token.state = TokenState::Hell;
            token.position = 0;
            token.stacked_with.clear();
        }
    }
    if !captured.is_empty() {
        events.push(GameEvent::CaptureOccurred {
            seat,
            owner_seat: owner,
            token_ids: captured,
            square,
        });
    }
}

/// Merge every token the mover's owner has on `square` into one stack.
fn merge_own(st: &mut GameState, events: &mut Vec<GameEvent>, seat: SeatIndex, square: u8) {
    let mut members: Vec<TokenId> = st
        .road_occupants(square)
        .into_iter()
        .filter(|t| t.owner == seat)
        .map(|t| t.id)
        .collect();
    members.sort_unstable();
    if members.len() > 1
        && members
            .iter()
            .any(|&id| st.token(id).map(|t| t.stack_height()) != Some(members.len() as u8))
    {
        set_stack(st, &members);
        events.push(GameEvent::StackMerged {
            seat,
            token_ids: members,
            square,
        });
    }
}

fn merge_homestretch(
    st: &mut GameState,
    events: &mut Vec<GameEvent>,
    seat: SeatIndex,
    index: u8,
    _moved: &[TokenId],
) {
    let mut members: Vec<TokenId> = st
        .tokens_of(seat)
        .filter(|t| t.state == TokenState::Homestretch && t.position == index)
        .map(|t| t.id)
        .collect();
    members.sort_unstable();
    if members.len() > 1
        && members
            .iter()
            .any(|&id| st.token(id).map(|t| t.stack_height()) != Some(members.len() as u8))
    {
        set_stack(st, &members);
        events.push(GameEvent::StackMerged {
            seat,
            token_ids: members,
            square: index,
        });
    }
}

fn check_finish(st: &mut GameState, events: &mut Vec<GameEvent>, seat: SeatIndex) {
    if st.is_finished(seat) {
        return;
    }
    let all_home = st.tokens_of(seat).all(|t| t.state == TokenState::Heaven);
    if !all_home {
        return;
    }
    st.finished.push(seat);

    let game_over = st.ruleset.end_on_first_finish || st.finished.len() + 1 >= st.seats.len();
    if game_over {
        let mut rankings = st.finished.clone();
        rankings.extend(st.seats.iter().copied().filter(|s| !st.is_finished(*s)));
        st.phase = TurnPhase::Finished;
        events.push(GameEvent::GameEnded { rankings });
    }
}

fn end_turn(st: &mut GameState, events: &mut Vec<GameEvent>) {
    let seat = st.current_seat();
    events.push(GameEvent::TurnEnded { seat });
    st.rolled.clear();
    st.available_dice.clear();
    st.consecutive_sixes = 0;
    st.pending_capture = None;

    for _ in 0..st.seats.len() {
        st.current = (st.current + 1) % st.seats.len();
        if !st.is_finished(st.current_seat()) {
            break;
        }
    }

    st.checkpoint = TurnCheckpoint {
        tokens: st.tokens.clone(),
        finished: st.finished.clone(),
    };
    st.phase = TurnPhase::AwaitingRoll;
    let next = st.current_seat();
    events.push(GameEvent::TurnStarted { seat: next });
    events.push(GameEvent::RollGranted { seat: next });
}

fn consume_die(st: &mut GameState, die: u8) {
    if let Some(pos) = st.available_dice.iter().position(|&d| d == die) {
        st.available_dice.remove(pos);
    }
}

fn move_unit(st: &mut GameState, ids: &[TokenId], dest: TrackPosition) {
    for &id in ids {
        if let Some(token) = st.token_mut(id) {
            match dest {
                TrackPosition::Road { square } => {
                    token.state = TokenState::Road;
                    token.position = square;
                }
                TrackPosition::Homestretch { index } => {
                    token.state = TokenState::Homestretch;
                    token.position = index;
                }
                TrackPosition::Heaven => {
                    token.state = TokenState::Heaven;
                    token.position = 0;
                    token.stacked_with.clear();
                }
                TrackPosition::Hell => {
                    token.state = TokenState::Hell;
                    token.position = 0;
                    token.stacked_with.clear();
                }
            }
        }
    }
    if dest != TrackPosition::Heaven {
        set_stack(st, ids);
    }
}

/// Point every member of a group at the other members; a group of one is
/// a plain unstacked token.
fn set_stack(st: &mut GameState, members: &[TokenId]) {
    let all: BTreeSet<TokenId> = members.iter().copied().collect();
    for &id in members {
        if let Some(token) = st.token_mut(id) {
            let mut others = all.clone();
            others.remove(&id);
            token.stacked_with = others;
        }
    }
}
