use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::protocol::{
    room_codes, ReadyStatus, RequestId, RoomId, RoomSnapshot, RoomStatus, SeatStatus, UserId,
};

use super::{
    CreateRoomParams, CreatedRoom, JoinOutcome, LeaveOutcome, RepositoryError, RoomRecord,
    RoomRepository, SeatRecord,
};

/// Give up on a unique code after this many collisions.
const MAX_CODE_ATTEMPTS: usize = 10;

/// Give up on an optimistic write after this many version conflicts.
const MAX_VERSION_RETRIES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdempotencyStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
struct IdempotencyRecord {
    user_id: UserId,
    status: IdempotencyStatus,
    response: Option<CreatedRoom>,
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<RoomId, RoomRecord>,
    /// code -> room, live (non-closed) rooms only.
    codes: HashMap<String, RoomId>,
    idempotency: HashMap<RequestId, IdempotencyRecord>,
}

/// In-memory repository with the same semantics the SQL schema enforces:
/// idempotent creation, lowest-free-seat joins, ready-state transitions
/// and version-checked writes.
#[derive(Default)]
pub struct InMemoryRoomRepository {
    inner: RwLock<Inner>,
}

impl InMemoryRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimistic write: snapshot the record, apply `f`, and commit only
    /// if the stored version is still the one we read. Retried a bounded
    /// number of times, then surfaced as a conflict.
    async fn mutate<T>(
        &self,
        room_id: RoomId,
        f: impl Fn(&mut RoomRecord) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        for _ in 0..MAX_VERSION_RETRIES {
            let (mut candidate, expected) = {
                let inner = self.inner.read().await;
                let record = inner
                    .rooms
                    .get(&room_id)
                    .ok_or(RepositoryError::RoomNotFound)?;
                (record.clone(), record.version)
            };

            let out = f(&mut candidate)?;
            candidate.version = expected + 1;

            let mut inner = self.inner.write().await;
            match inner.rooms.get(&room_id) {
                Some(current) if current.version == expected => {
                    let closed = candidate.status == RoomStatus::Closed;
                    let code = candidate.code.clone();
                    inner.rooms.insert(room_id, candidate);
                    if closed {
                        inner.codes.remove(&code);
                    }
                    return Ok(out);
                }
                Some(_) => continue,
                None => return Err(RepositoryError::RoomNotFound),
            }
        }
        Err(RepositoryError::Conflict)
    }
}

/// Re-derive the lobby status from seat state: `ready_to_start` iff at
/// least two occupied seats and every occupied seat is ready.
fn recompute_lobby_status(room: &mut RoomRecord) {
    if !room.status.is_lobby() {
        return;
    }
    let occupied: Vec<&SeatRecord> = room
        .seats
        .iter()
        .filter(|s| s.status == SeatStatus::Occupied)
        .collect();
    let all_ready = occupied.len() >= 2 && occupied.iter().all(|s| s.ready == ReadyStatus::Ready);
    room.status = if all_ready {
        RoomStatus::ReadyToStart
    } else {
        RoomStatus::Open
    };
}

fn close(room: &mut RoomRecord) {
    room.status = RoomStatus::Closed;
    room.closed_at = Some(Utc::now());
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn find_or_create(
        &self,
        user_id: UserId,
        request_id: RequestId,
        params: CreateRoomParams,
    ) -> Result<CreatedRoom, RepositoryError> {
        if !(2..=4).contains(&params.max_players) {
            return Err(RepositoryError::Invalid(format!(
                "max_players must be between 2 and 4, got {}",
                params.max_players
            )));
        }

        // The whole operation happens under one write lock, which stands in
        // for the SQL transaction: the idempotency record commits together
        // with the room rows.
        let mut inner = self.inner.write().await;

        if let Some(record) = inner.idempotency.get(&request_id) {
            match record.status {
                IdempotencyStatus::Completed => {
                    let mut response = record
                        .response
                        .clone()
                        .ok_or(RepositoryError::Conflict)?;
                    response.cached = true;
                    return Ok(response);
                }
                IdempotencyStatus::InProgress => {
                    return Err(RepositoryError::RequestInProgress);
                }
                IdempotencyStatus::Failed => {
                    // A failed attempt may be retried under the same id.
                }
            }
        }

        // A user who already owns an open room gets that room back.
        let existing = inner
            .rooms
            .values()
            .find(|r| r.owner_id == user_id && r.status == RoomStatus::Open)
            .and_then(|room| {
                room.seat_of(&user_id).map(|seat| CreatedRoom {
                    room_id: room.id,
                    code: room.code.clone(),
                    seat_index: seat.seat_index,
                    is_host: seat.is_host,
                    cached: false,
                })
            });
        if let Some(response) = existing {
            inner.idempotency.insert(
                request_id,
                IdempotencyRecord {
                    user_id,
                    status: IdempotencyStatus::Completed,
                    response: Some(response.clone()),
                },
            );
            return Ok(response);
        }

        let mut code = None;
        for _ in 0..MAX_CODE_ATTEMPTS {
            let candidate = room_codes::generate_room_code();
            if !inner.codes.contains_key(&candidate) {
                code = Some(candidate);
                break;
            }
        }
        let Some(code) = code else {
            inner.idempotency.insert(
                request_id,
                IdempotencyRecord {
                    user_id,
                    status: IdempotencyStatus::Failed,
                    response: None,
                },
            );
            return Err(RepositoryError::CodeGenerationFailed);
        };

        let room_id = Uuid::new_v4();
        let mut seats: Vec<SeatRecord> =
            (0..params.max_players).map(SeatRecord::empty).collect();
        seats[0] = SeatRecord {
            seat_index: 0,
            user_id: Some(user_id),
            display_name: None,
            is_host: true,
            ready: ReadyStatus::NotReady,
            connected: false,
            status: SeatStatus::Occupied,
            joined_at: Some(Utc::now()),
            left_at: None,
        };

        let record = RoomRecord {
            id: room_id,
            code: code.clone(),
            owner_id: user_id,
            status: RoomStatus::Open,
            visibility: params.visibility,
            max_players: params.max_players,
            ruleset_id: params.ruleset_id,
            ruleset_config: params.ruleset_config,
            created_at: Utc::now(),
            started_at: None,
            closed_at: None,
            version: 1,
            seats,
        };
        inner.codes.insert(code.clone(), room_id);
        inner.rooms.insert(room_id, record);

        let response = CreatedRoom {
            room_id,
            code,
            seat_index: 0,
            is_host: true,
            cached: false,
        };
        inner.idempotency.insert(
            request_id,
            IdempotencyRecord {
                user_id,
                status: IdempotencyStatus::Completed,
                response: Some(response.clone()),
            },
        );
        Ok(response)
    }

    async fn resolve_by_code(&self, code: &str) -> Result<RoomRecord, RepositoryError> {
        let normalized = room_codes::normalize_room_code(code);
        let inner = self.inner.read().await;
        inner
            .codes
            .get(&normalized)
            .and_then(|room_id| inner.rooms.get(room_id))
            .cloned()
            .ok_or(RepositoryError::RoomNotFound)
    }

    async fn get_room(&self, room_id: RoomId) -> Result<RoomRecord, RepositoryError> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or(RepositoryError::RoomNotFound)
    }

    async fn join_seat(
        &self,
        room_id: RoomId,
        user_id: UserId,
        display_name: Option<&str>,
    ) -> Result<JoinOutcome, RepositoryError> {
        // Idempotent rejoin: an already seated user gets their seat back
        // without a write.
        {
            let inner = self.inner.read().await;
            let room = inner
                .rooms
                .get(&room_id)
                .ok_or(RepositoryError::RoomNotFound)?;
            if room.status == RoomStatus::Closed {
                return Err(RepositoryError::RoomClosed);
            }
            if let Some(seat) = room.seat_of(&user_id) {
                return Ok(JoinOutcome {
                    seat_index: seat.seat_index,
                    snapshot: room.snapshot(),
                });
            }
            if room.status == RoomStatus::InGame {
                return Err(RepositoryError::RoomInGame);
            }
        }

        let display_name = display_name.map(str::to_string);
        self.mutate(room_id, move |room| {
            if room.status == RoomStatus::Closed {
                return Err(RepositoryError::RoomClosed);
            }
            if let Some(seat) = room.seat_of(&user_id) {
                return Ok(JoinOutcome {
                    seat_index: seat.seat_index,
                    snapshot: room.snapshot(),
                });
            }
            if room.status == RoomStatus::InGame {
                return Err(RepositoryError::RoomInGame);
            }
            let seat = room
                .seats
                .iter_mut()
                .find(|s| s.user_id.is_none())
                .ok_or(RepositoryError::RoomFull)?;
            seat.user_id = Some(user_id);
            seat.display_name = display_name.clone();
            seat.status = SeatStatus::Occupied;
            seat.ready = ReadyStatus::NotReady;
            seat.connected = false;
            seat.joined_at = Some(Utc::now());
            seat.left_at = None;
            let seat_index = seat.seat_index;
            recompute_lobby_status(room);
            Ok(JoinOutcome {
                seat_index,
                snapshot: RoomSnapshot {
                    version: room.version + 1,
                    ..room.snapshot()
                },
            })
        })
        .await
    }

    async fn toggle_ready(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<RoomSnapshot, RepositoryError> {
        self.mutate(room_id, move |room| {
            if !room.status.is_lobby() {
                return Err(RepositoryError::BadStatus(room.status));
            }
            let seat = room
                .seats
                .iter_mut()
                .find(|s| s.user_id == Some(user_id))
                .ok_or(RepositoryError::NotInRoom)?;
            seat.ready = match seat.ready {
                ReadyStatus::Ready => ReadyStatus::NotReady,
                ReadyStatus::NotReady => ReadyStatus::Ready,
            };
            recompute_lobby_status(room);
            Ok(RoomSnapshot {
                version: room.version + 1,
                ..room.snapshot()
            })
        })
        .await
    }

    async fn leave_seat(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<LeaveOutcome, RepositoryError> {
        self.mutate(room_id, move |room| {
            if room.status == RoomStatus::Closed {
                return Err(RepositoryError::RoomClosed);
            }
            let seat = room
                .seats
                .iter_mut()
                .find(|s| s.user_id == Some(user_id))
                .ok_or(RepositoryError::NotInRoom)?;
            let was_host = seat.is_host;
            seat.user_id = None;
            seat.display_name = None;
            seat.is_host = false;
            seat.ready = ReadyStatus::NotReady;
            seat.connected = false;
            seat.status = SeatStatus::Left;
            seat.left_at = Some(Utc::now());

            let room_closed = was_host && room.status.is_lobby();
            if room_closed {
                close(room);
            } else {
                if was_host {
                    // Deterministic host succession: lowest occupied seat.
                    if let Some(next) = room
                        .seats
                        .iter_mut()
                        .find(|s| s.status == SeatStatus::Occupied)
                    {
                        next.is_host = true;
                    }
                }
                recompute_lobby_status(room);
            }
            Ok(LeaveOutcome {
                snapshot: RoomSnapshot {
                    version: room.version + 1,
                    ..room.snapshot()
                },
                room_closed,
            })
        })
        .await
    }

    async fn set_seat_connected(
        &self,
        room_id: RoomId,
        user_id: UserId,
        connected: bool,
    ) -> Result<RoomSnapshot, RepositoryError> {
        self.mutate(room_id, move |room| {
            let seat = room
                .seats
                .iter_mut()
                .find(|s| s.user_id == Some(user_id))
                .ok_or(RepositoryError::NotInRoom)?;
            seat.connected = connected;
            if !connected {
                seat.ready = ReadyStatus::NotReady;
                recompute_lobby_status(room);
            }
            Ok(RoomSnapshot {
                version: room.version + 1,
                ..room.snapshot()
            })
        })
        .await
    }

    async fn start_game(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<RoomSnapshot, RepositoryError> {
        self.mutate(room_id, move |room| {
            let seat = room
                .seat_of(&user_id)
                .ok_or(RepositoryError::NotInRoom)?;
            if !seat.is_host {
                return Err(RepositoryError::NotHost);
            }
            if room.status != RoomStatus::ReadyToStart {
                return Err(RepositoryError::BadStatus(room.status));
            }
            room.status = RoomStatus::InGame;
            room.started_at = Some(Utc::now());
            Ok(RoomSnapshot {
                version: room.version + 1,
                ..room.snapshot()
            })
        })
        .await
    }

    async fn close_room(&self, room_id: RoomId) -> Result<RoomSnapshot, RepositoryError> {
        self.mutate(room_id, move |room| {
            if room.status != RoomStatus::Closed {
                close(room);
            }
            Ok(RoomSnapshot {
                version: room.version + 1,
                ..room.snapshot()
            })
        })
        .await
    }

    async fn get_snapshot(&self, room_id: RoomId) -> Result<RoomSnapshot, RepositoryError> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(&room_id)
            .map(RoomRecord::snapshot)
            .ok_or(RepositoryError::RoomNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> InMemoryRoomRepository {
        InMemoryRoomRepository::new()
    }

    async fn create(repo: &InMemoryRoomRepository, user: UserId) -> CreatedRoom {
        repo.find_or_create(user, Uuid::new_v4(), CreateRoomParams::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_seats_host_on_seat_zero() {
        let repo = repo();
        let user = Uuid::new_v4();
        let created = create(&repo, user).await;

        assert!(created.is_host);
        assert_eq!(created.seat_index, 0);
        assert!(!created.cached);
        assert!(room_codes::is_valid_room_code(&created.code));

        let snapshot = repo.get_snapshot(created.room_id).await.unwrap();
        assert_eq!(snapshot.status, RoomStatus::Open);
        assert_eq!(snapshot.seats.len(), 4);
        assert_eq!(snapshot.seats[0].user_id, Some(user));
        assert!(snapshot.seats[0].is_host);
        assert!(snapshot.seats[1..].iter().all(|s| s.user_id.is_none()));
        assert_eq!(snapshot.version, 1);
    }

    #[tokio::test]
    async fn replayed_request_id_returns_cached_payload_and_one_room() {
        let repo = repo();
        let user = Uuid::new_v4();
        let request_id = Uuid::new_v4();

        let first = repo
            .find_or_create(user, request_id, CreateRoomParams::default())
            .await
            .unwrap();
        let second = repo
            .find_or_create(user, request_id, CreateRoomParams::default())
            .await
            .unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.room_id, second.room_id);
        assert_eq!(first.code, second.code);
        assert_eq!(first.seat_index, second.seat_index);

        assert_eq!(repo.inner.read().await.rooms.len(), 1);
    }

    #[tokio::test]
    async fn owner_of_an_open_room_gets_it_back_under_a_new_request() {
        let repo = repo();
        let user = Uuid::new_v4();
        let first = create(&repo, user).await;
        let second = create(&repo, user).await;

        assert_eq!(first.room_id, second.room_id);
        assert!(!second.cached);
        assert_eq!(repo.inner.read().await.rooms.len(), 1);
    }

    #[tokio::test]
    async fn invalid_max_players_is_rejected() {
        let repo = repo();
        let err = repo
            .find_or_create(
                Uuid::new_v4(),
                Uuid::new_v4(),
                CreateRoomParams {
                    max_players: 5,
                    ..CreateRoomParams::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Invalid(_)));
    }

    #[tokio::test]
    async fn resolve_by_code_is_case_insensitive() {
        let repo = repo();
        let created = create(&repo, Uuid::new_v4()).await;
        let room = repo
            .resolve_by_code(&created.code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(room.id, created.room_id);
        assert_eq!(room.code, created.code);

        assert_eq!(
            repo.resolve_by_code("ZZZZZ9").await.unwrap_err(),
            RepositoryError::RoomNotFound
        );
    }

    #[tokio::test]
    async fn join_takes_lowest_empty_seat_and_rejoin_is_idempotent() {
        let repo = repo();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let created = create(&repo, host).await;

        let joined = repo
            .join_seat(created.room_id, guest, Some("Guest"))
            .await
            .unwrap();
        assert_eq!(joined.seat_index, 1);
        assert_eq!(
            joined.snapshot.seats[1].display_name,
            Some("Guest".to_string())
        );

        let rejoined = repo
            .join_seat(created.room_id, guest, Some("Guest"))
            .await
            .unwrap();
        assert_eq!(rejoined.seat_index, 1);
        // Idempotent rejoin does not bump the version.
        assert_eq!(rejoined.snapshot.version, joined.snapshot.version);
        assert_eq!(
            rejoined
                .snapshot
                .seats
                .iter()
                .filter(|s| s.user_id == Some(guest))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn join_rejects_full_and_closed_rooms() {
        let repo = repo();
        let host = Uuid::new_v4();
        let created = repo
            .find_or_create(
                host,
                Uuid::new_v4(),
                CreateRoomParams {
                    max_players: 2,
                    ..CreateRoomParams::default()
                },
            )
            .await
            .unwrap();

        repo.join_seat(created.room_id, Uuid::new_v4(), None)
            .await
            .unwrap();
        assert_eq!(
            repo.join_seat(created.room_id, Uuid::new_v4(), None)
                .await
                .unwrap_err(),
            RepositoryError::RoomFull
        );

        repo.close_room(created.room_id).await.unwrap();
        assert_eq!(
            repo.join_seat(created.room_id, Uuid::new_v4(), None)
                .await
                .unwrap_err(),
            RepositoryError::RoomClosed
        );
    }

    #[tokio::test]
    async fn ready_flow_reaches_ready_to_start_and_back() {
        let repo = repo();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let created = create(&repo, host).await;
        repo.join_seat(created.room_id, guest, None).await.unwrap();

        let snapshot = repo.toggle_ready(created.room_id, host).await.unwrap();
        assert_eq!(snapshot.status, RoomStatus::Open);

        let snapshot = repo.toggle_ready(created.room_id, guest).await.unwrap();
        assert_eq!(snapshot.status, RoomStatus::ReadyToStart);

        // Flipping any ready flag back restores `open`.
        let snapshot = repo.toggle_ready(created.room_id, host).await.unwrap();
        assert_eq!(snapshot.status, RoomStatus::Open);
    }

    #[tokio::test]
    async fn lone_ready_player_does_not_arm_the_room() {
        let repo = repo();
        let host = Uuid::new_v4();
        let created = create(&repo, host).await;
        let snapshot = repo.toggle_ready(created.room_id, host).await.unwrap();
        assert_eq!(snapshot.status, RoomStatus::Open);
    }

    #[tokio::test]
    async fn host_leaving_lobby_closes_the_room() {
        let repo = repo();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let created = create(&repo, host).await;
        repo.join_seat(created.room_id, guest, None).await.unwrap();

        let outcome = repo.leave_seat(created.room_id, host).await.unwrap();
        assert!(outcome.room_closed);
        assert_eq!(outcome.snapshot.status, RoomStatus::Closed);

        let room = repo.get_room(created.room_id).await.unwrap();
        assert!(room.closed_at.is_some());
        // Closed rooms release their code.
        assert_eq!(
            repo.resolve_by_code(&created.code).await.unwrap_err(),
            RepositoryError::RoomNotFound
        );
    }

    #[tokio::test]
    async fn non_host_leaving_vacates_seat_and_in_game_host_leave_reassigns() {
        let repo = repo();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let created = create(&repo, host).await;
        repo.join_seat(created.room_id, guest, None).await.unwrap();

        let outcome = repo.leave_seat(created.room_id, guest).await.unwrap();
        assert!(!outcome.room_closed);
        assert_eq!(outcome.snapshot.seats[1].user_id, None);

        // Bring the guest back, start the game, then the host leaves:
        // the room stays up and the host flag moves down.
        repo.join_seat(created.room_id, guest, None).await.unwrap();
        repo.toggle_ready(created.room_id, host).await.unwrap();
        repo.toggle_ready(created.room_id, guest).await.unwrap();
        repo.start_game(created.room_id, host).await.unwrap();

        let outcome = repo.leave_seat(created.room_id, host).await.unwrap();
        assert!(!outcome.room_closed);
        assert_eq!(outcome.snapshot.status, RoomStatus::InGame);
        let new_host = outcome.snapshot.host_seat().unwrap();
        assert_eq!(new_host.user_id, Some(guest));
    }

    #[tokio::test]
    async fn start_game_requires_host_and_ready_room() {
        let repo = repo();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let created = create(&repo, host).await;
        repo.join_seat(created.room_id, guest, None).await.unwrap();

        assert_eq!(
            repo.start_game(created.room_id, host).await.unwrap_err(),
            RepositoryError::BadStatus(RoomStatus::Open)
        );

        repo.toggle_ready(created.room_id, host).await.unwrap();
        repo.toggle_ready(created.room_id, guest).await.unwrap();

        assert_eq!(
            repo.start_game(created.room_id, guest).await.unwrap_err(),
            RepositoryError::NotHost
        );

        let snapshot = repo.start_game(created.room_id, host).await.unwrap();
        assert_eq!(snapshot.status, RoomStatus::InGame);
        let room = repo.get_room(created.room_id).await.unwrap();
        assert!(room.started_at.is_some());

        // A member may rejoin an in-game room; a stranger may not.
        let rejoin = repo.join_seat(created.room_id, guest, None).await.unwrap();
        assert_eq!(rejoin.seat_index, 1);
        assert_eq!(
            repo.join_seat(created.room_id, Uuid::new_v4(), None)
                .await
                .unwrap_err(),
            RepositoryError::RoomInGame
        );
    }

    #[tokio::test]
    async fn disconnect_clears_ready_and_downgrades_armed_room() {
        let repo = repo();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let created = create(&repo, host).await;
        repo.join_seat(created.room_id, guest, None).await.unwrap();
        repo.set_seat_connected(created.room_id, host, true)
            .await
            .unwrap();
        repo.toggle_ready(created.room_id, host).await.unwrap();
        repo.toggle_ready(created.room_id, guest).await.unwrap();

        let snapshot = repo
            .set_seat_connected(created.room_id, guest, false)
            .await
            .unwrap();
        assert_eq!(snapshot.status, RoomStatus::Open);
        assert_eq!(snapshot.seats[1].ready, ReadyStatus::NotReady);
        assert!(!snapshot.seats[1].connected);
        assert!(snapshot.seats[0].connected);
    }

    #[tokio::test]
    async fn versions_bump_on_every_write() {
        let repo = repo();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let created = create(&repo, host).await;

        let v1 = repo.get_snapshot(created.room_id).await.unwrap().version;
        let joined = repo.join_seat(created.room_id, guest, None).await.unwrap();
        assert_eq!(joined.snapshot.version, v1 + 1);
        let ready = repo.toggle_ready(created.room_id, host).await.unwrap();
        assert_eq!(ready.version, v1 + 2);
    }
}
