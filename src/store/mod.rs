//! The storage collaborator consumed by the engine.
//!
//! Every write goes through a [`Txn`]: a batch of [`Event`]s scoped to one room (or to the
//! catalog) that the backend commits all-or-nothing. The engine never issues a bare
//! single-row write, so a reservation and its room's status always change together.

mod memory;
mod wal_store;

pub use memory::MemoryStore;
pub use wal_store::WalStore;

use std::io;

use async_trait::async_trait;

use crate::model::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("WAL writer shut down")]
    WriterClosed,
    #[error("WAL writer dropped response")]
    ResponseDropped,
}

/// What a transaction is allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnScope {
    /// Room and guest registration changes.
    Catalog,
    /// One room's reservations and its status.
    Room(RoomId),
}

/// A set of writes committed as one durable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Txn {
    scope: TxnScope,
    events: Vec<Event>,
}

impl Txn {
    pub fn for_room(room_id: RoomId) -> Self {
        Self {
            scope: TxnScope::Room(room_id),
            events: Vec::new(),
        }
    }

    pub fn catalog() -> Self {
        Self {
            scope: TxnScope::Catalog,
            events: Vec::new(),
        }
    }

    pub fn scope(&self) -> TxnScope {
        self.scope
    }

    pub fn insert_reservation(&mut self, reservation: Reservation) -> ReservationId {
        debug_assert!(
            self.covers_room(reservation.room_id),
            "reservation outside transaction scope"
        );
        let id = reservation.id;
        self.events.push(Event::ReservationInserted(reservation));
        id
    }

    pub fn update_reservation_status(&mut self, id: ReservationId, status: ReservationStatus) {
        self.events.push(Event::ReservationStatusChanged { id, status });
    }

    pub fn update_room_status(&mut self, room_id: RoomId, status: RoomStatus) {
        debug_assert!(self.covers_room(room_id), "room outside transaction scope");
        self.events.push(Event::RoomStatusChanged { id: room_id, status });
    }

    pub fn save_room(&mut self, room: Room) {
        self.events.push(Event::RoomSaved(room));
    }

    pub fn delete_room(&mut self, id: RoomId) {
        self.events.push(Event::RoomDeleted { id });
    }

    pub fn save_guest(&mut self, guest: Guest) {
        self.events.push(Event::GuestSaved(guest));
    }

    pub fn delete_guest(&mut self, id: GuestId) {
        self.events.push(Event::GuestDeleted { id });
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    fn covers_room(&self, room_id: RoomId) -> bool {
        match self.scope {
            TxnScope::Catalog => true,
            TxnScope::Room(id) => id == room_id,
        }
    }
}

/// Narrow persistence interface. Lookups may be stale relative to concurrent commits;
/// the engine's locks decide who may write.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn load_reservations_for_room(&self, room_id: RoomId) -> Result<Vec<Reservation>, StoreError>;

    async fn load_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    async fn load_reservations(&self) -> Result<Vec<Reservation>, StoreError>;

    async fn load_room(&self, id: RoomId) -> Result<Option<Room>, StoreError>;

    async fn load_rooms(&self) -> Result<Vec<Room>, StoreError>;

    async fn load_guest(&self, id: GuestId) -> Result<Option<Guest>, StoreError>;

    async fn load_guests(&self) -> Result<Vec<Guest>, StoreError>;

    /// Durably apply every write in `txn`, or none of them.
    async fn commit(&self, txn: Txn) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn txn_collects_writes_in_order() {
        let room_id = RoomId::new();
        let reservation = Reservation {
            id: ReservationId::new(),
            guest_id: GuestId::new(),
            room_id,
            stay: Stay::new(1, 3).unwrap(),
            total: Decimal::new(200, 0),
            status: ReservationStatus::Active,
            created_on: 0,
        };

        let mut txn = Txn::for_room(room_id);
        assert!(txn.is_empty());
        let id = txn.insert_reservation(reservation.clone());
        txn.update_room_status(room_id, RoomStatus::Occupied);

        assert_eq!(id, reservation.id);
        assert_eq!(txn.scope(), TxnScope::Room(room_id));
        assert_eq!(
            txn.into_events(),
            vec![
                Event::ReservationInserted(reservation),
                Event::RoomStatusChanged { id: room_id, status: RoomStatus::Occupied },
            ]
        );
    }
}
