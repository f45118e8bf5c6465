use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::*;
use crate::model::*;
use crate::store::{MemoryStore, StoreError, Txn, TxnScope, WalStore};

fn d(s: &str) -> Day {
    parse_day(s).unwrap()
}

fn dec(units: i64) -> Decimal {
    Decimal::new(units, 0)
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("hotel_reservas_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn fixed_clock(day: Day) -> Clock {
    Arc::new(move || day)
}

/// Far from every stay used below, so rooms stay FREE unless a test moves the clock.
fn engine() -> Engine {
    Engine::with_clock(Arc::new(MemoryStore::new()), EngineConfig::default(), fixed_clock(0))
}

fn engine_with_clock(clock: Clock) -> Engine {
    Engine::with_clock(Arc::new(MemoryStore::new()), EngineConfig::default(), clock)
}

/// Memory store whose room-scoped commits take `delay`, to hold a writer inside its critical section.
struct SlowRoomCommits {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl Storage for SlowRoomCommits {
    async fn load_reservations_for_room(&self, room_id: RoomId) -> Result<Vec<Reservation>, StoreError> {
        self.inner.load_reservations_for_room(room_id).await
    }

    async fn load_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        self.inner.load_reservation(id).await
    }

    async fn load_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        self.inner.load_reservations().await
    }

    async fn load_room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        self.inner.load_room(id).await
    }

    async fn load_rooms(&self) -> Result<Vec<Room>, StoreError> {
        self.inner.load_rooms().await
    }

    async fn load_guest(&self, id: GuestId) -> Result<Option<Guest>, StoreError> {
        self.inner.load_guest(id).await
    }

    async fn load_guests(&self) -> Result<Vec<Guest>, StoreError> {
        self.inner.load_guests().await
    }

    async fn commit(&self, txn: Txn) -> Result<(), StoreError> {
        if matches!(txn.scope(), TxnScope::Room(_)) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.commit(txn).await
    }
}

async fn room_101(engine: &Engine) -> RoomId {
    engine.register_room("101", "Casal", dec(100), None).await.unwrap()
}

async fn guest(engine: &Engine, name: &str) -> GuestId {
    engine.register_guest(name, None, None).await.unwrap()
}

// ── Booking ──────────────────────────────────────────────

#[tokio::test]
async fn engine_booking_scenario() {
    let engine = engine();
    let room = room_101(&engine).await;
    let a = guest(&engine, "Ana").await;
    let b = guest(&engine, "Bruno").await;

    let receipt = engine
        .create_reservation(a, room, d("2024-01-01"), d("2024-01-03"))
        .await
        .unwrap();
    assert_eq!(receipt.total, dec(200));
    assert_eq!(receipt.nights, 2);
    assert_eq!(receipt.room_id, room);

    let err = engine
        .create_reservation(b, room, d("2024-01-02"), d("2024-01-04"))
        .await
        .unwrap_err();
    match err {
        EngineError::RoomUnavailable { conflicting, stay, .. } => {
            assert_eq!(conflicting, receipt.reservation_id);
            assert_eq!(stay, Stay::new(d("2024-01-01"), d("2024-01-03")).unwrap());
        }
        other => panic!("unexpected error: {other}"),
    }

    // Check-out day is free for the next check-in.
    let adjacent = engine
        .create_reservation(b, room, d("2024-01-03"), d("2024-01-05"))
        .await
        .unwrap();
    assert_eq!(adjacent.total, dec(200));
    assert_eq!(engine.reservations_for_room(room).await.unwrap().len(), 2);
}

#[tokio::test]
async fn engine_quote_is_rate_times_nights() {
    let engine = engine();
    let room = engine
        .register_room("202", "Suite", Decimal::new(15050, 2), None)
        .await
        .unwrap();
    for (start, end) in [(10, 11), (10, 17), (100, 130)] {
        let quote = engine.quote(room, start, end).await.unwrap();
        assert_eq!(quote, Decimal::new(15050, 2) * Decimal::from(end - start));
    }
    assert!(matches!(
        engine.quote(room, 10, 10).await,
        Err(EngineError::InvalidRange { .. })
    ));
    assert!(matches!(
        engine.quote(RoomId::new(), 10, 11).await,
        Err(EngineError::NotFound(Entity::Room(_)))
    ));
}

#[tokio::test]
async fn engine_invalid_range_never_persists() {
    let engine = engine();
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;

    for (start, end) in [(10, 10), (10, 9), (d("2024-01-03"), d("2024-01-01"))] {
        let result = engine.create_reservation(g, room, start, end).await;
        assert!(matches!(result, Err(EngineError::InvalidRange { .. })));
    }
    assert!(engine.list_reservations(None).await.unwrap().is_empty());
    assert_eq!(engine.summary().await.unwrap().reservations, 0);
}

#[tokio::test]
async fn engine_create_unknown_guest_or_room() {
    let engine = engine();
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;

    assert!(matches!(
        engine.create_reservation(GuestId::new(), room, 1, 2).await,
        Err(EngineError::NotFound(Entity::Guest(_)))
    ));
    assert!(matches!(
        engine.create_reservation(g, RoomId::new(), 1, 2).await,
        Err(EngineError::NotFound(Entity::Room(_)))
    ));
}

#[tokio::test]
async fn engine_stay_too_long_rejected() {
    let engine = engine();
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;
    assert!(matches!(
        engine.create_reservation(g, room, 10, 1_000).await,
        Err(EngineError::LimitExceeded(_))
    ));
}

#[tokio::test]
async fn engine_check_availability_ignores_inactive() {
    let engine = engine();
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;

    let r = engine.create_reservation(g, room, 10, 15).await.unwrap();
    assert!(!engine.check_availability(room, 12, 13).await.unwrap());
    assert!(engine.check_availability(room, 15, 20).await.unwrap());
    assert!(engine.check_availability(room, 5, 10).await.unwrap());

    engine.finalize_reservation(r.reservation_id).await.unwrap();
    assert!(engine.check_availability(room, 12, 13).await.unwrap());
}

// ── Transitions ──────────────────────────────────────────

#[tokio::test]
async fn engine_cancel_is_idempotent() {
    let engine = engine();
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;
    let r = engine.create_reservation(g, room, 10, 12).await.unwrap();

    assert_eq!(engine.cancel_reservation(r.reservation_id).await.unwrap(), Transition::Applied);
    assert_eq!(engine.cancel_reservation(r.reservation_id).await.unwrap(), Transition::Unchanged);
    let stored = engine.get_reservation(r.reservation_id).await.unwrap();
    assert_eq!(stored.status, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn engine_finalize_is_idempotent() {
    let engine = engine();
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;
    let r = engine.create_reservation(g, room, 10, 12).await.unwrap();

    assert_eq!(engine.finalize_reservation(r.reservation_id).await.unwrap(), Transition::Applied);
    assert_eq!(engine.finalize_reservation(r.reservation_id).await.unwrap(), Transition::Unchanged);
    assert_eq!(
        engine.get_reservation(r.reservation_id).await.unwrap().status,
        ReservationStatus::Finalized
    );
}

#[tokio::test]
async fn engine_terminal_states_do_not_cross() {
    let engine = engine();
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;
    let cancelled = engine.create_reservation(g, room, 10, 12).await.unwrap().reservation_id;
    let finalized = engine.create_reservation(g, room, 20, 22).await.unwrap().reservation_id;
    engine.cancel_reservation(cancelled).await.unwrap();
    engine.finalize_reservation(finalized).await.unwrap();

    assert!(matches!(
        engine.finalize_reservation(cancelled).await,
        Err(EngineError::InvalidTransition {
            from: ReservationStatus::Cancelled,
            to: ReservationStatus::Finalized,
            ..
        })
    ));
    assert!(matches!(
        engine.cancel_reservation(finalized).await,
        Err(EngineError::InvalidTransition {
            from: ReservationStatus::Finalized,
            to: ReservationStatus::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn engine_cancel_unknown_reservation() {
    let engine = engine();
    assert!(matches!(
        engine.cancel_reservation(ReservationId::new()).await,
        Err(EngineError::NotFound(Entity::Reservation(_)))
    ));
}

#[tokio::test]
async fn engine_cancel_frees_room_for_availability() {
    let engine = engine();
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;
    let r = engine.create_reservation(g, room, 10, 15).await.unwrap();

    let ids = |rooms: Vec<RoomSummary>| rooms.into_iter().map(|r| r.id).collect::<Vec<_>>();
    assert!(!ids(engine.query_availability(12, 13).await.unwrap()).contains(&room));

    engine.cancel_reservation(r.reservation_id).await.unwrap();
    for (start, end) in [(10, 15), (12, 13), (1, 100)] {
        assert!(ids(engine.query_availability(start, end).await.unwrap()).contains(&room));
    }
    // and the vacated range can be booked again
    engine.create_reservation(g, room, 10, 15).await.unwrap();
}

// ── Occupancy ────────────────────────────────────────────

#[tokio::test]
async fn engine_occupancy_follows_active_stay_containing_today() {
    let today = Arc::new(AtomicI32::new(d("2024-03-10")));
    let clock: Clock = {
        let today = today.clone();
        Arc::new(move || today.load(Ordering::SeqCst))
    };
    let engine = engine_with_clock(clock);
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;

    // future stay: still free today
    let future = engine
        .create_reservation(g, room, d("2024-04-01"), d("2024-04-03"))
        .await
        .unwrap();
    assert_eq!(engine.get_room(room).await.unwrap().status, RoomStatus::Free);

    let current = engine
        .create_reservation(g, room, d("2024-03-09"), d("2024-03-12"))
        .await
        .unwrap();
    assert_eq!(engine.get_room(room).await.unwrap().status, RoomStatus::Occupied);

    // cancelling the future stay leaves the current guest in place
    engine.cancel_reservation(future.reservation_id).await.unwrap();
    assert_eq!(engine.get_room(room).await.unwrap().status, RoomStatus::Occupied);

    engine.finalize_reservation(current.reservation_id).await.unwrap();
    assert_eq!(engine.get_room(room).await.unwrap().status, RoomStatus::Free);
}

#[tokio::test]
async fn engine_refresh_occupancy_after_date_rolls_over() {
    let today = Arc::new(AtomicI32::new(99));
    let clock: Clock = {
        let today = today.clone();
        Arc::new(move || today.load(Ordering::SeqCst))
    };
    let engine = engine_with_clock(clock);
    let room = room_101(&engine).await;
    let other = engine.register_room("102", "Solteiro", dec(80), None).await.unwrap();
    let g = guest(&engine, "Ana").await;
    engine.create_reservation(g, room, 100, 102).await.unwrap();
    assert_eq!(engine.get_room(room).await.unwrap().status, RoomStatus::Free);

    today.store(100, Ordering::SeqCst);
    assert_eq!(engine.refresh_occupancy().await.unwrap(), 1);
    assert_eq!(engine.get_room(room).await.unwrap().status, RoomStatus::Occupied);
    assert_eq!(engine.get_room(other).await.unwrap().status, RoomStatus::Free);
    assert_eq!(engine.refresh_occupancy().await.unwrap(), 0);

    today.store(102, Ordering::SeqCst);
    assert_eq!(engine.refresh_occupancy().await.unwrap(), 1);
    assert_eq!(engine.get_room(room).await.unwrap().status, RoomStatus::Free);
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn engine_concurrent_overlapping_creates_one_wins() {
    let engine = Arc::new(engine());
    let room = room_101(&engine).await;
    let a = guest(&engine, "Ana").await;
    let b = guest(&engine, "Bruno").await;

    for round in 0..20 {
        let start = round * 10;
        let e1 = engine.clone();
        let e2 = engine.clone();
        let t1 = tokio::spawn(async move { e1.create_reservation(a, room, start, start + 3).await });
        let t2 = tokio::spawn(async move { e2.create_reservation(b, room, start + 1, start + 4).await });
        let results = [t1.await.unwrap(), t2.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "round {round}");
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(EngineError::RoomUnavailable { .. }))),
            "round {round}"
        );
    }
    assert_eq!(engine.reservations_for_room(room).await.unwrap().len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn engine_concurrent_disjoint_creates_both_win() {
    let engine = Arc::new(engine());
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.create_reservation(g, room, i * 2, i * 2 + 2).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(engine.reservations_for_room(room).await.unwrap().len(), 16);
}

#[tokio::test]
async fn engine_busy_when_room_lock_held() {
    let engine = Engine::with_clock(
        Arc::new(MemoryStore::new()),
        EngineConfig {
            lock_timeout: Duration::from_millis(20),
        },
        fixed_clock(0),
    );
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;

    let held = engine.locks.room(room).await.unwrap();
    let err = engine.create_reservation(g, room, 10, 12).await.unwrap_err();
    assert!(matches!(err, EngineError::Busy(LockScope::Room(id)) if id == room));
    assert!(err.is_retryable());
    assert!(engine.reservations_for_room(room).await.unwrap().is_empty());

    drop(held);
    engine.create_reservation(g, room, 10, 12).await.unwrap();
}

#[tokio::test]
async fn engine_pause_writes_blocks_mutations() {
    let engine = Engine::with_clock(
        Arc::new(MemoryStore::new()),
        EngineConfig {
            lock_timeout: Duration::from_millis(20),
        },
        fixed_clock(0),
    );
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;

    let pause = engine.pause_writes().await.unwrap();
    assert!(matches!(
        engine.create_reservation(g, room, 1, 2).await,
        Err(EngineError::Busy(_))
    ));
    assert!(matches!(
        engine.register_room("103", "Casal", dec(90), None).await,
        Err(EngineError::Busy(LockScope::Catalog))
    ));
    // reads are unaffected
    assert_eq!(engine.list_rooms(None).await.unwrap().len(), 1);
    drop(pause);
    engine.create_reservation(g, room, 1, 2).await.unwrap();
}

#[tokio::test]
async fn engine_cancelled_caller_still_commits() {
    let store = Arc::new(SlowRoomCommits {
        inner: MemoryStore::new(),
        delay: Duration::from_millis(150),
    });
    let engine = Engine::with_clock(store, EngineConfig::default(), fixed_clock(2));
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;

    // The caller gives up while its commit is in flight.
    let gave_up = tokio::time::timeout(Duration::from_millis(30), engine.create_reservation(g, room, 1, 3)).await;
    assert!(gave_up.is_err());

    // The next writer waits for the room and finds the abandoned booking in place.
    assert!(matches!(
        engine.create_reservation(g, room, 2, 4).await,
        Err(EngineError::RoomUnavailable { .. })
    ));
    let reservations = engine.reservations_for_room(room).await.unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].stay, Stay::new(1, 3).unwrap());
    assert!(reservations[0].is_active());
    assert_eq!(engine.get_room(room).await.unwrap().status, RoomStatus::Occupied);
}

#[tokio::test]
async fn engine_guest_edits_do_not_wait_for_room_writers() {
    let store = Arc::new(SlowRoomCommits {
        inner: MemoryStore::new(),
        delay: Duration::from_millis(200),
    });
    let config = EngineConfig {
        lock_timeout: Duration::from_millis(50),
    };
    let engine = Arc::new(Engine::with_clock(store, config, fixed_clock(0)));
    let room = room_101(&engine).await;
    let ana = guest(&engine, "Ana").await;

    let booking = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.create_reservation(ana, room, 1, 3).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // the room writer is mid-commit; guest add and edit still go through
    let bruno = guest(&engine, "Bruno").await;
    engine.update_guest(ana, "Ana Souza", None, None).await.unwrap();
    // deletion and room registration need the catalog exclusively
    assert!(matches!(engine.delete_guest(bruno).await, Err(EngineError::Busy(LockScope::Catalog))));
    assert!(matches!(
        engine.register_room("102", "Casal", dec(90), None).await,
        Err(EngineError::Busy(LockScope::Catalog))
    ));

    booking.await.unwrap().unwrap();
    let pause = engine.pause_writes().await.unwrap();
    assert!(matches!(
        engine.register_guest("Carla", None, None).await,
        Err(EngineError::Busy(LockScope::Catalog))
    ));
    drop(pause);
    engine.delete_guest(bruno).await.unwrap();
}

// ── Registry ─────────────────────────────────────────────

#[tokio::test]
async fn engine_duplicate_room_number_rejected() {
    let engine = engine();
    room_101(&engine).await;
    assert!(matches!(
        engine.register_room(" 101 ", "Suite", dec(300), None).await,
        Err(EngineError::DuplicateRoom(n)) if n == "101"
    ));
    let other = engine.register_room("A1", "Suite", dec(300), None).await.unwrap();
    assert!(matches!(
        engine.register_room("a1", "Suite", dec(300), None).await,
        Err(EngineError::DuplicateRoom(_))
    ));
    assert!(matches!(
        engine.update_room(other, "101", "Suite", dec(300), None).await,
        Err(EngineError::DuplicateRoom(_))
    ));
}

#[tokio::test]
async fn engine_room_validation() {
    let engine = engine();
    assert!(matches!(
        engine.register_room("101", "Casal", dec(-1), None).await,
        Err(EngineError::InvalidRate(_))
    ));
    assert!(matches!(
        engine.register_room("", "Casal", dec(1), None).await,
        Err(EngineError::MissingField("number"))
    ));
    assert!(engine.list_rooms(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn engine_rate_bounds() {
    let engine = engine();
    for rate in [Decimal::MAX, Decimal::from(100_000_000), Decimal::new(1001, 3)] {
        assert!(matches!(
            engine.register_room("900", "Suite", rate, None).await,
            Err(EngineError::InvalidRate(_))
        ));
    }
    let suite = engine
        .register_room("900", "Suite", Decimal::new(9_999_999_999, 2), None)
        .await
        .unwrap();
    assert!(matches!(
        engine.update_room(suite, "900", "Suite", Decimal::MAX, None).await,
        Err(EngineError::InvalidRate(_))
    ));

    let g = guest(&engine, "Ana").await;
    let receipt = engine.create_reservation(g, suite, 10, 376).await.unwrap();
    assert_eq!(receipt.total, Decimal::new(9_999_999_999, 2) * Decimal::from(366));
    assert_eq!(
        engine.quote(suite, 10, 12).await.unwrap(),
        Decimal::new(19_999_999_998, 2)
    );
}

#[tokio::test]
async fn engine_extreme_days_are_rejected_not_panicking() {
    let engine = engine();
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;
    assert!(matches!(
        engine.query_availability(Day::MIN, Day::MAX).await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert!(engine.check_availability(room, Day::MIN, Day::MAX).await.unwrap());
    assert!(matches!(
        engine.create_reservation(g, room, Day::MIN, Day::MAX).await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert_eq!(
        engine.quote(room, Day::MIN, Day::MAX).await.unwrap(),
        dec(100) * Decimal::from(u32::MAX)
    );
    assert!(engine.reservations_for_room(room).await.unwrap().is_empty());
}

#[tokio::test]
async fn engine_update_room_keeps_booked_totals() {
    let engine = engine();
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;
    let r = engine.create_reservation(g, room, 10, 12).await.unwrap();

    let updated = engine
        .update_room(room, "101", "Luxo", dec(150), Some("vista mar"))
        .await
        .unwrap();
    assert_eq!(updated.rate, dec(150));
    assert_eq!(updated.description.as_deref(), Some("vista mar"));
    assert_eq!(engine.get_reservation(r.reservation_id).await.unwrap().total, dec(200));
    assert_eq!(engine.quote(room, 10, 12).await.unwrap(), dec(300));
}

#[tokio::test]
async fn engine_delete_policies() {
    let engine = engine();
    let room = room_101(&engine).await;
    let empty = engine.register_room("102", "Casal", dec(100), None).await.unwrap();
    let g = guest(&engine, "Ana").await;
    let idle = guest(&engine, "Bruno").await;
    let r = engine.create_reservation(g, room, 10, 12).await.unwrap();
    engine.cancel_reservation(r.reservation_id).await.unwrap();

    // history counts, even when cancelled
    assert!(matches!(
        engine.delete_room(room).await,
        Err(EngineError::HasReservations(Entity::Room(_)))
    ));
    assert!(matches!(
        engine.delete_guest(g).await,
        Err(EngineError::HasReservations(Entity::Guest(_)))
    ));

    engine.delete_room(empty).await.unwrap();
    engine.delete_guest(idle).await.unwrap();
    assert!(matches!(engine.get_room(empty).await, Err(EngineError::NotFound(_))));
    assert!(matches!(engine.get_guest(idle).await, Err(EngineError::NotFound(_))));
    assert!(matches!(engine.delete_room(empty).await, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn engine_guest_crud() {
    let engine = engine();
    let id = engine
        .register_guest(" Maria Souza ", Some("11 9999-0000"), Some("maria@example.com"))
        .await
        .unwrap();
    let stored = engine.get_guest(id).await.unwrap();
    assert_eq!(stored.name, "Maria Souza");

    let updated = engine
        .update_guest(id, "Maria S. Lima", None, Some("maria@example.com"))
        .await
        .unwrap();
    assert_eq!(updated.phone, None);
    assert_eq!(updated.registered_on, stored.registered_on);

    assert!(matches!(
        engine.register_guest("   ", None, None).await,
        Err(EngineError::MissingField("name"))
    ));
    assert!(matches!(
        engine.update_guest(GuestId::new(), "X", None, None).await,
        Err(EngineError::NotFound(_))
    ));
}

// ── Read models ──────────────────────────────────────────

#[tokio::test]
async fn engine_filters_are_case_insensitive() {
    let engine = engine();
    let r101 = room_101(&engine).await;
    engine.register_room("12", "Suite Master", dec(400), None).await.unwrap();
    engine.register_room("B2", "Casal", dec(120), None).await.unwrap();
    let ana = engine
        .register_guest("Ana Paula", None, Some("ana@hotel.com"))
        .await
        .unwrap();
    let bruno = guest(&engine, "Bruno").await;

    let numbers: Vec<String> = engine
        .list_rooms(None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.number)
        .collect();
    assert_eq!(numbers, vec!["12", "101", "B2"]);
    assert_eq!(engine.list_rooms(Some("CASAL")).await.unwrap().len(), 2);
    assert_eq!(engine.list_rooms(Some("free")).await.unwrap().len(), 3);
    assert_eq!(engine.list_guests(Some("HOTEL.COM")).await.unwrap().len(), 1);
    assert_eq!(engine.list_guests(Some("  ")).await.unwrap().len(), 2);

    let a = engine.create_reservation(ana, r101, 10, 12).await.unwrap();
    engine.create_reservation(bruno, r101, 20, 22).await.unwrap();
    engine.cancel_reservation(a.reservation_id).await.unwrap();

    assert_eq!(engine.list_reservations(Some("paula")).await.unwrap().len(), 1);
    assert_eq!(engine.list_reservations(Some("101")).await.unwrap().len(), 2);
    let cancelled = engine.list_reservations(Some("cancelled")).await.unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, a.reservation_id);
    assert_eq!(engine.reservations_for_guest(bruno).await.unwrap().len(), 1);
}

#[tokio::test]
async fn engine_summary_counts() {
    let engine = engine_with_clock(fixed_clock(11));
    let room = room_101(&engine).await;
    engine.register_room("102", "Casal", dec(100), None).await.unwrap();
    let g = guest(&engine, "Ana").await;
    engine.create_reservation(g, room, 10, 12).await.unwrap();

    let summary = engine.summary().await.unwrap();
    assert_eq!(
        summary,
        Summary {
            guests: 1,
            rooms: 2,
            reservations: 1,
            free_rooms: 1,
        }
    );
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn engine_wal_replay() {
    let path = test_wal_path("engine_replay.wal");
    let (room, reservation) = {
        let store = Arc::new(WalStore::open(&path).unwrap());
        let engine = Engine::with_clock(store, EngineConfig::default(), fixed_clock(11));
        let room = room_101(&engine).await;
        let g = guest(&engine, "Ana").await;
        let kept = engine.create_reservation(g, room, 10, 12).await.unwrap();
        let cancelled = engine.create_reservation(g, room, 20, 22).await.unwrap();
        engine.cancel_reservation(cancelled.reservation_id).await.unwrap();
        (room, kept.reservation_id)
    };

    let store = Arc::new(WalStore::open(&path).unwrap());
    let engine = Engine::with_clock(store, EngineConfig::default(), fixed_clock(11));
    assert_eq!(engine.get_room(room).await.unwrap().status, RoomStatus::Occupied);
    assert_eq!(engine.get_reservation(reservation).await.unwrap().total, dec(200));
    let statuses: Vec<ReservationStatus> = engine
        .reservations_for_room(room)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.status)
        .collect();
    assert_eq!(statuses, vec![ReservationStatus::Active, ReservationStatus::Cancelled]);
    assert!(matches!(
        engine.create_reservation(GuestId::new(), room, 11, 12).await,
        Err(EngineError::NotFound(Entity::Guest(_)))
    ));
    let g = engine.list_guests(None).await.unwrap()[0].id;
    assert!(matches!(
        engine.create_reservation(g, room, 11, 12).await,
        Err(EngineError::RoomUnavailable { .. })
    ));
}

#[tokio::test]
async fn engine_compaction_under_pause() {
    let path = test_wal_path("engine_compact.wal");
    let store = Arc::new(WalStore::open(&path).unwrap());
    let engine = Engine::with_clock(store.clone(), EngineConfig::default(), fixed_clock(0));
    let room = room_101(&engine).await;
    let g = guest(&engine, "Ana").await;
    for i in 0..5 {
        engine.create_reservation(g, room, i * 3, i * 3 + 2).await.unwrap();
    }
    assert_eq!(store.appends_since_compact().await, 7);

    {
        let _pause = engine.pause_writes().await.unwrap();
        store.compact().await.unwrap();
    }
    assert_eq!(store.appends_since_compact().await, 0);
    drop(engine);
    drop(store);

    let reopened = Arc::new(WalStore::open(&path).unwrap());
    let engine = Engine::with_clock(reopened, EngineConfig::default(), fixed_clock(0));
    assert_eq!(engine.reservations_for_room(room).await.unwrap().len(), 5);
    assert_eq!(engine.list_guests(None).await.unwrap().len(), 1);
}
