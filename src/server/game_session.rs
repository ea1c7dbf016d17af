use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::engine::{
    initial_events, process_action, DiceRoller, GameAction, GameError, GameEvent, GameState,
    Ruleset, SeatIndex, StdDice,
};
use crate::protocol::{
    ConnectionId, ErrorCode, GameActionPayload, RoomId, RoomSnapshot, ServerFrame, ServerMessage,
    UserId,
};

use super::message_router::HandlerResult;
use super::GameServer;

/// Live game bound to one room. The state sits behind an async mutex so
/// actions for the room apply strictly one at a time, in arrival order.
/// Nothing is persisted; the game is memory-resident.
pub(crate) struct GameSession {
    seat_by_user: HashMap<UserId, SeatIndex>,
    state: Mutex<GameState>,
}

impl GameSession {
    /// Build the opening state from the room's occupied seats, in seat
    /// order.
    fn new(snapshot: &RoomSnapshot, ruleset: Ruleset) -> Self {
        let mut seat_by_user = HashMap::new();
        let mut seats: Vec<SeatIndex> = Vec::new();
        for seat in snapshot.occupied_seats() {
            if let Some(user_id) = seat.user_id {
                seat_by_user.insert(user_id, seat.seat_index);
                seats.push(seat.seat_index);
            }
        }
        seats.sort_unstable();
        Self {
            seat_by_user,
            state: Mutex::new(GameState::new(seats, ruleset)),
        }
    }

    pub fn seat_of(&self, user_id: &UserId) -> Option<SeatIndex> {
        self.seat_by_user.get(user_id).copied()
    }

    pub async fn state_snapshot(&self) -> GameState {
        self.state.lock().await.clone()
    }

    /// Feed one action through the engine under the session lock. The
    /// lock spans only the pure state transition; fanning the events out
    /// happens after release.
    pub async fn apply(
        &self,
        action: &GameAction,
        roller: &mut dyn DiceRoller,
    ) -> Result<Vec<GameEvent>, GameError> {
        let mut state = self.state.lock().await;
        let (next, events) = process_action(&state, action, roller)?;
        *state = next;
        Ok(events)
    }
}

impl GameServer {
    /// Host-only lobby -> game transition: flips the room, binds a fresh
    /// session, and announces the opening state to every member.
    pub(crate) async fn handle_start_game(
        &self,
        connection_id: &ConnectionId,
        request_id: Option<Uuid>,
        user_id: UserId,
        room_id: RoomId,
    ) -> HandlerResult {
        let (snapshot, state, events) = {
            let _guard = self.room_locks.lock(room_id).await;
            let snapshot = match self.repository.start_game(room_id, user_id).await {
                Ok(snapshot) => snapshot,
                Err(err) => return HandlerResult::error(err.code(), err.to_string()),
            };
            let record = match self.repository.get_room(room_id).await {
                Ok(record) => record,
                Err(err) => return HandlerResult::error(err.code(), err.to_string()),
            };
            let ruleset = Ruleset::from_config(&record.ruleset_config);
            let session = Arc::new(GameSession::new(&snapshot, ruleset));
            let state = session.state_snapshot().await;
            let events = initial_events(&state);
            self.sessions.insert(room_id, session);
            self.sync_room_cache(&snapshot).await;
            (snapshot, state, events)
        };

        info!(%room_id, host = %user_id, players = snapshot.occupied_seats().count(),
            "Game started");

        // Room update first (reply to the host, broadcast to the rest),
        // then the game messages to the whole room in one order.
        self.connections.send_to_connection(
            connection_id,
            Arc::new(ServerFrame::reply(
                request_id,
                ServerMessage::RoomUpdated {
                    room: snapshot.clone(),
                },
            )),
        );
        self.connections.send_to_room(
            &room_id,
            &Arc::new(ServerFrame::broadcast(ServerMessage::RoomUpdated {
                room: snapshot,
            })),
            Some(connection_id),
        );
        self.connections.send_to_room(
            &room_id,
            &Arc::new(ServerFrame::broadcast(ServerMessage::GameStarted {
                room_id,
                state,
            })),
            None,
        );
        self.connections.send_to_room(
            &room_id,
            &Arc::new(ServerFrame::broadcast(ServerMessage::GameEvents {
                room_id,
                events,
            })),
            None,
        );
        HandlerResult::none()
    }

    /// Feed a `game_action` frame into the room's session. Events fan out
    /// to the whole room; rejections go back to the sender alone and leave
    /// state untouched.
    pub(crate) async fn handle_game_action(
        &self,
        connection_id: &ConnectionId,
        request_id: Option<Uuid>,
        user_id: UserId,
        room_id: RoomId,
        payload: GameActionPayload,
    ) -> HandlerResult {
        if matches!(payload, GameActionPayload::StartGame) {
            return self
                .handle_start_game(connection_id, request_id, user_id, room_id)
                .await;
        }

        let Some(session) = self.sessions.get(&room_id).map(|e| Arc::clone(e.value()))
        else {
            return HandlerResult::game_error(ErrorCode::BadPhase, "no game in progress");
        };
        let Some(seat) = session.seat_of(&user_id) else {
            return HandlerResult::error(ErrorCode::NotInRoom, "user holds no seat in this game");
        };

        let action = match payload {
            GameActionPayload::Roll => GameAction::Roll { seat },
            GameActionPayload::Move { token_ids, die } => GameAction::Move {
                seat,
                token_ids,
                die,
            },
            GameActionPayload::CaptureChoice { owner_seat } => GameAction::CaptureChoice {
                seat,
                owner_seat,
            },
            GameActionPayload::StartGame => return HandlerResult::none(),
        };

        let mut roller = StdDice;
        match session.apply(&action, &mut roller).await {
            Ok(events) => {
                self.connections.send_to_room(
                    &room_id,
                    &Arc::new(ServerFrame::broadcast(ServerMessage::GameEvents {
                        room_id,
                        events,
                    })),
                    None,
                );
                HandlerResult::none()
            }
            Err(err) => {
                let code = match err {
                    GameError::BadPhase(_) => ErrorCode::BadPhase,
                    GameError::NotYourTurn | GameError::IllegalMove(_) => ErrorCode::IllegalMove,
                };
                HandlerResult::game_error(code, err.to_string())
            }
        }
    }
}
