use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::*;

use super::{Storage, StoreError, Txn};

/// Indexed in-memory tables. Also the materialized state behind [`super::WalStore`].
pub struct MemoryStore {
    guests: DashMap<GuestId, Guest>,
    rooms: DashMap<RoomId, Room>,
    /// Room → its reservations, sorted by check-in.
    books: DashMap<RoomId, RoomBook>,
    /// Reverse lookup: reservation id → room id
    reservation_to_room: DashMap<ReservationId, RoomId>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            guests: DashMap::new(),
            rooms: DashMap::new(),
            books: DashMap::new(),
            reservation_to_room: DashMap::new(),
        }
    }

    // ── Lookups ──────────────────────────────────────────────

    pub fn room(&self, id: &RoomId) -> Option<Room> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    pub fn guest(&self, id: &GuestId) -> Option<Guest> {
        self.guests.get(id).map(|e| e.value().clone())
    }

    pub fn guests(&self) -> Vec<Guest> {
        self.guests.iter().map(|e| e.value().clone()).collect()
    }

    pub fn room_for_reservation(&self, id: &ReservationId) -> Option<RoomId> {
        self.reservation_to_room.get(id).map(|e| *e.value())
    }

    pub fn reservation(&self, id: &ReservationId) -> Option<Reservation> {
        let room_id = self.room_for_reservation(id)?;
        let book = self.books.get(&room_id)?;
        book.get(*id).cloned()
    }

    pub fn reservations_for_room(&self, room_id: &RoomId) -> Vec<Reservation> {
        self.books
            .get(room_id)
            .map(|book| book.reservations.clone())
            .unwrap_or_default()
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        self.books
            .iter()
            .flat_map(|e| e.value().reservations.clone())
            .collect()
    }

    /// Events that recreate the current state from scratch: guests, then rooms, then
    /// reservations with their current status.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.guests().into_iter().map(Event::GuestSaved).collect();
        events.extend(self.rooms().into_iter().map(Event::RoomSaved));
        events.extend(self.reservations().into_iter().map(Event::ReservationInserted));
        events
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::GuestSaved(guest) => {
                self.guests.insert(guest.id, guest.clone());
            }
            Event::GuestDeleted { id } => {
                self.guests.remove(id);
            }
            Event::RoomSaved(room) => {
                self.rooms.insert(room.id, room.clone());
                self.books.entry(room.id).or_default();
            }
            Event::RoomDeleted { id } => {
                self.rooms.remove(id);
                if let Some((_, book)) = self.books.remove(id) {
                    for r in &book.reservations {
                        self.reservation_to_room.remove(&r.id);
                    }
                }
            }
            Event::RoomStatusChanged { id, status } => {
                if let Some(mut room) = self.rooms.get_mut(id) {
                    room.status = *status;
                }
            }
            Event::ReservationInserted(reservation) => {
                self.books
                    .entry(reservation.room_id)
                    .or_default()
                    .insert(reservation.clone());
                self.reservation_to_room
                    .insert(reservation.id, reservation.room_id);
            }
            Event::ReservationStatusChanged { id, status } => {
                if let Some(room_id) = self.room_for_reservation(id)
                    && let Some(mut book) = self.books.get_mut(&room_id)
                {
                    book.set_status(*id, *status);
                }
            }
        }
    }

    pub fn apply_all(&self, events: &[Event]) {
        for event in events {
            self.apply_event(event);
        }
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn load_reservations_for_room(&self, room_id: RoomId) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.reservations_for_room(&room_id))
    }

    async fn load_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.reservation(&id))
    }

    async fn load_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.reservations())
    }

    async fn load_room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.room(&id))
    }

    async fn load_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.rooms())
    }

    async fn load_guest(&self, id: GuestId) -> Result<Option<Guest>, StoreError> {
        Ok(self.guest(&id))
    }

    async fn load_guests(&self) -> Result<Vec<Guest>, StoreError> {
        Ok(self.guests())
    }

    async fn commit(&self, txn: Txn) -> Result<(), StoreError> {
        self.apply_all(txn.events());
        Ok(())
    }
}
