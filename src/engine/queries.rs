use rust_decimal::Decimal;

use crate::model::*;

use super::{Engine, EngineError};

// Reads take no lock and may be stale; `create_reservation` re-checks under the room lock.
impl Engine {
    pub async fn get_room(&self, id: RoomId) -> Result<Room, EngineError> {
        self.registry.get(id).await
    }

    pub async fn list_rooms(&self, filter: Option<&str>) -> Result<Vec<Room>, EngineError> {
        self.registry.list(filter).await
    }

    /// Rooms free for the whole of `[start, end)`, ordered by room number.
    pub async fn query_availability(&self, start: Day, end: Day) -> Result<Vec<RoomSummary>, EngineError> {
        let stay = Stay::new(start, end)?;
        let rooms = self.registry.list_available(&stay).await?;
        Ok(rooms.iter().map(RoomSummary::from).collect())
    }

    pub async fn quote(&self, room_id: RoomId, start: Day, end: Day) -> Result<Decimal, EngineError> {
        let stay = Stay::new(start, end)?;
        self.ledger.quote(room_id, &stay).await
    }

    pub async fn check_availability(&self, room_id: RoomId, start: Day, end: Day) -> Result<bool, EngineError> {
        let stay = Stay::new(start, end)?;
        self.ledger.check_availability(room_id, &stay).await
    }

    pub async fn get_guest(&self, id: GuestId) -> Result<Guest, EngineError> {
        self.registry.get_guest(id).await
    }

    pub async fn list_guests(&self, filter: Option<&str>) -> Result<Vec<Guest>, EngineError> {
        self.registry.list_guests(filter).await
    }

    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.ledger.get(id).await
    }

    pub async fn list_reservations(&self, filter: Option<&str>) -> Result<Vec<Reservation>, EngineError> {
        self.ledger.list(filter).await
    }

    pub async fn reservations_for_guest(&self, guest_id: GuestId) -> Result<Vec<Reservation>, EngineError> {
        self.ledger.for_guest(guest_id).await
    }

    pub async fn reservations_for_room(&self, room_id: RoomId) -> Result<Vec<Reservation>, EngineError> {
        self.ledger.for_room(room_id).await
    }

    pub async fn summary(&self) -> Result<Summary, EngineError> {
        self.ledger.summary().await
    }
}
