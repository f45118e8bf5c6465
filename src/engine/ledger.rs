use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::limits::MAX_RESERVATIONS_PER_ROOM;
use crate::model::*;
use crate::observability::BOOKING_CONFLICTS_TOTAL;
use crate::store::{Storage, Txn};

use super::conflict::{check_no_conflict, price, validate_stay};
use super::registry::{normalized_filter, Registry};
use super::{Clock, EngineError, Entity};

/// Reservation records and their invariants. Mutations assume the caller holds the
/// room's exclusivity token; reads take no lock.
pub(crate) struct Ledger {
    store: Arc<dyn Storage>,
    registry: Arc<Registry>,
    clock: Clock,
}

impl Ledger {
    pub(crate) fn new(store: Arc<dyn Storage>, registry: Arc<Registry>, clock: Clock) -> Self {
        Self { store, registry, clock }
    }

    async fn book(&self, room_id: RoomId) -> Result<RoomBook, EngineError> {
        Ok(RoomBook::new(self.store.load_reservations_for_room(room_id).await?))
    }

    /// `rate × nights` at the room's current rate.
    pub async fn quote(&self, room_id: RoomId, stay: &Stay) -> Result<Decimal, EngineError> {
        let room = self.registry.get(room_id).await?;
        price(room.rate, stay)
    }

    pub async fn check_availability(&self, room_id: RoomId, stay: &Stay) -> Result<bool, EngineError> {
        self.registry.get(room_id).await?;
        Ok(self.book(room_id).await?.first_conflict(stay).is_none())
    }

    /// Validate, check overlap and write reservation plus room status as one commit.
    pub async fn create(&self, guest_id: GuestId, room_id: RoomId, stay: Stay) -> Result<Reservation, EngineError> {
        validate_stay(&stay)?;
        self.registry.get_guest(guest_id).await?;
        let room = self.registry.get(room_id).await?;
        let mut book = self.book(room_id).await?;
        if book.reservations.len() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many reservations on room"));
        }

        if let Err(e) = check_no_conflict(&book, room_id, &stay) {
            metrics::counter!(BOOKING_CONFLICTS_TOTAL).increment(1);
            debug!("room {} rejected {stay}: {e}", room.number);
            return Err(e);
        }

        let today = (self.clock)();
        let reservation = Reservation {
            id: ReservationId::new(),
            guest_id,
            room_id,
            stay,
            total: price(room.rate, &stay)?,
            status: ReservationStatus::Active,
            created_on: today,
        };

        let mut txn = Txn::for_room(room_id);
        txn.insert_reservation(reservation.clone());
        book.insert(reservation.clone());
        let occupancy = book.occupancy_on(today);
        if occupancy != room.status {
            txn.update_room_status(room_id, occupancy);
        }
        self.store.commit(txn).await?;

        info!(
            "reservation {} created: room {} {stay}, {} nights, total {}",
            reservation.id,
            room.number,
            stay.nights(),
            reservation.total
        );
        Ok(reservation)
    }

    /// ACTIVE → `target` (cancel or finalize), re-deriving the room's occupancy from
    /// what stays ACTIVE. Repeating a transition already taken is a no-op.
    pub async fn transition(&self, id: ReservationId, target: ReservationStatus) -> Result<Transition, EngineError> {
        let reservation = self.get(id).await?;
        match reservation.status {
            current if current == target => {
                debug!("reservation {id} already {target}");
                return Ok(Transition::Unchanged);
            }
            ReservationStatus::Active => {}
            from => {
                return Err(EngineError::InvalidTransition { id, from, to: target });
            }
        }

        let room = self.registry.get(reservation.room_id).await?;
        let mut book = self.book(room.id).await?;
        book.set_status(id, target);

        let mut txn = Txn::for_room(room.id);
        txn.update_reservation_status(id, target);
        let occupancy = book.occupancy_on((self.clock)());
        if occupancy != room.status {
            txn.update_room_status(room.id, occupancy);
        }
        self.store.commit(txn).await?;

        info!("reservation {id} {target}: room {} now {occupancy}", room.number);
        Ok(Transition::Applied)
    }

    /// Bring the cached room status in line with today's ACTIVE stays.
    /// Returns whether it changed and the status now stored.
    pub async fn sync_occupancy(&self, room_id: RoomId) -> Result<(bool, RoomStatus), EngineError> {
        let room = self.registry.get(room_id).await?;
        let occupancy = self.book(room_id).await?.occupancy_on((self.clock)());
        if occupancy == room.status {
            return Ok((false, occupancy));
        }
        self.registry.set_status(room_id, occupancy).await?;
        Ok((true, occupancy))
    }

    // ── Read models ──────────────────────────────────────────

    pub async fn get(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.store
            .load_reservation(id)
            .await?
            .ok_or(EngineError::NotFound(Entity::Reservation(id)))
    }

    /// Newest first; `filter` matches guest name, room number or status, ignoring case.
    pub async fn list(&self, filter: Option<&str>) -> Result<Vec<Reservation>, EngineError> {
        let mut reservations = self.store.load_reservations().await?;
        if let Some(needle) = normalized_filter(filter) {
            let guests: HashMap<GuestId, String> = self
                .store
                .load_guests()
                .await?
                .into_iter()
                .map(|g| (g.id, g.name.to_lowercase()))
                .collect();
            let rooms: HashMap<RoomId, String> = self
                .store
                .load_rooms()
                .await?
                .into_iter()
                .map(|r| (r.id, r.number.to_lowercase()))
                .collect();
            reservations.retain(|r| {
                guests.get(&r.guest_id).is_some_and(|name| name.contains(&needle))
                    || rooms.get(&r.room_id).is_some_and(|number| number.contains(&needle))
                    || r.status.to_string().to_lowercase().contains(&needle)
            });
        }
        sort_newest_first(&mut reservations);
        Ok(reservations)
    }

    pub async fn for_guest(&self, guest_id: GuestId) -> Result<Vec<Reservation>, EngineError> {
        self.registry.get_guest(guest_id).await?;
        let mut reservations: Vec<Reservation> = self
            .store
            .load_reservations()
            .await?
            .into_iter()
            .filter(|r| r.guest_id == guest_id)
            .collect();
        sort_newest_first(&mut reservations);
        Ok(reservations)
    }

    /// Ordered by check-in.
    pub async fn for_room(&self, room_id: RoomId) -> Result<Vec<Reservation>, EngineError> {
        self.registry.get(room_id).await?;
        Ok(self.book(room_id).await?.reservations)
    }

    pub async fn summary(&self) -> Result<Summary, EngineError> {
        let rooms = self.store.load_rooms().await?;
        Ok(Summary {
            guests: self.store.load_guests().await?.len(),
            rooms: rooms.len(),
            reservations: self.store.load_reservations().await?.len(),
            free_rooms: rooms.iter().filter(|r| r.status == RoomStatus::Free).count(),
        })
    }
}

fn sort_newest_first(reservations: &mut [Reservation]) {
    reservations.sort_by(|a, b| (b.created_on, b.id).cmp(&(a.created_on, a.id)));
}
