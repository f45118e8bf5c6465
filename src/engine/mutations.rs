use std::time::Instant;

use futures::{stream, StreamExt};
use rust_decimal::Decimal;
use tracing::info;

use crate::model::*;
use crate::observability::{record_op, ROOMS_OCCUPIED};

use super::{detached, Engine, EngineError};

/// Rooms re-derived at once by `refresh_occupancy`.
const REFRESH_CONCURRENCY: usize = 8;

impl Engine {
    // ── Reservations (per-room exclusive) ────────────────────

    /// Check and write happen under the room's lock, so two overlapping
    /// requests for one room can never both succeed.
    pub async fn create_reservation(
        &self,
        guest_id: GuestId,
        room_id: RoomId,
        start: Day,
        end: Day,
    ) -> Result<BookingReceipt, EngineError> {
        let started = Instant::now();
        let result = self.create_reservation_inner(guest_id, room_id, start, end).await;
        record_op("create_reservation", &result, started);
        result
    }

    async fn create_reservation_inner(
        &self,
        guest_id: GuestId,
        room_id: RoomId,
        start: Day,
        end: Day,
    ) -> Result<BookingReceipt, EngineError> {
        let stay = Stay::new(start, end)?;
        self.registry.get(room_id).await?;

        let guard = self.locks.room(room_id).await?;
        let ledger = self.ledger.clone();
        let reservation = detached(guard, async move { ledger.create(guest_id, room_id, stay).await }).await?;
        Ok(BookingReceipt::from(&reservation))
    }

    /// Idempotent: cancelling a CANCELLED reservation returns `Unchanged`.
    pub async fn cancel_reservation(&self, id: ReservationId) -> Result<Transition, EngineError> {
        let started = Instant::now();
        let result = self.transition(id, ReservationStatus::Cancelled).await;
        record_op("cancel_reservation", &result, started);
        result
    }

    /// Idempotent: finalizing a FINALIZED reservation returns `Unchanged`.
    pub async fn finalize_reservation(&self, id: ReservationId) -> Result<Transition, EngineError> {
        let started = Instant::now();
        let result = self.transition(id, ReservationStatus::Finalized).await;
        record_op("finalize_reservation", &result, started);
        result
    }

    async fn transition(&self, id: ReservationId, target: ReservationStatus) -> Result<Transition, EngineError> {
        let room_id = self.ledger.get(id).await?.room_id;
        let guard = self.locks.room(room_id).await?;
        let ledger = self.ledger.clone();
        detached(guard, async move { ledger.transition(id, target).await }).await
    }

    /// Re-derive every room's cached status for today. Returns how many rooms changed.
    pub async fn refresh_occupancy(&self) -> Result<usize, EngineError> {
        let started = Instant::now();
        let result = self.refresh_occupancy_inner().await;
        record_op("refresh_occupancy", &result, started);
        result
    }

    async fn refresh_occupancy_inner(&self) -> Result<usize, EngineError> {
        let rooms = self.registry.list(None).await?;
        let outcomes: Vec<Result<Option<(bool, RoomStatus)>, EngineError>> = stream::iter(rooms)
            .map(|room| self.sync_room(room.id))
            .buffer_unordered(REFRESH_CONCURRENCY)
            .collect()
            .await;

        let mut changed = 0;
        let mut occupied = 0;
        for outcome in outcomes {
            let Some((updated, status)) = outcome? else { continue };
            if updated {
                changed += 1;
            }
            if status == RoomStatus::Occupied {
                occupied += 1;
            }
        }
        metrics::gauge!(ROOMS_OCCUPIED).set(occupied as f64);
        if changed > 0 {
            info!("occupancy refreshed: {changed} rooms changed, {occupied} occupied");
        }
        Ok(changed)
    }

    /// `None` if the room was deleted since it was listed.
    async fn sync_room(&self, room_id: RoomId) -> Result<Option<(bool, RoomStatus)>, EngineError> {
        let guard = self.locks.room(room_id).await?;
        let ledger = self.ledger.clone();
        match detached(guard, async move { ledger.sync_occupancy(room_id).await }).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(EngineError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ── Catalog (exclusive) ──────────────────────────────────

    pub async fn register_room(
        &self,
        number: &str,
        room_type: &str,
        rate: Decimal,
        description: Option<&str>,
    ) -> Result<RoomId, EngineError> {
        let started = Instant::now();
        let (number, room_type, description) = owned_room(number, room_type, description);
        let result = match self.locks.catalog().await {
            Ok(guard) => {
                let registry = self.registry.clone();
                detached(guard, async move {
                    registry
                        .register(&number, &room_type, rate, description.as_deref())
                        .await
                })
                .await
            }
            Err(e) => Err(e),
        };
        record_op("register_room", &result, started);
        result
    }

    pub async fn update_room(
        &self,
        id: RoomId,
        number: &str,
        room_type: &str,
        rate: Decimal,
        description: Option<&str>,
    ) -> Result<Room, EngineError> {
        let started = Instant::now();
        let (number, room_type, description) = owned_room(number, room_type, description);
        let result = match self.locks.catalog().await {
            Ok(guard) => {
                let registry = self.registry.clone();
                detached(guard, async move {
                    registry
                        .update(id, &number, &room_type, rate, description.as_deref())
                        .await
                })
                .await
            }
            Err(e) => Err(e),
        };
        record_op("update_room", &result, started);
        result
    }

    /// Refused while any reservation references the room.
    pub async fn delete_room(&self, id: RoomId) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = match self.locks.catalog().await {
            Ok(guard) => {
                let registry = self.registry.clone();
                let locks = self.locks.clone();
                detached(guard, async move {
                    registry.delete(id).await?;
                    locks.forget(&id);
                    Ok(())
                })
                .await
            }
            Err(e) => Err(e),
        };
        record_op("delete_room", &result, started);
        result
    }

    // Guest additions and edits hold the catalog shared; only deletion needs it exclusively.

    pub async fn register_guest(
        &self,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<GuestId, EngineError> {
        let started = Instant::now();
        let (name, phone, email) = owned_guest(name, phone, email);
        let result = match self.locks.catalog_shared().await {
            Ok(guard) => {
                let registry = self.registry.clone();
                detached(guard, async move {
                    registry
                        .register_guest(&name, phone.as_deref(), email.as_deref())
                        .await
                })
                .await
            }
            Err(e) => Err(e),
        };
        record_op("register_guest", &result, started);
        result
    }

    pub async fn update_guest(
        &self,
        id: GuestId,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<Guest, EngineError> {
        let started = Instant::now();
        let (name, phone, email) = owned_guest(name, phone, email);
        let result = match self.locks.catalog_shared().await {
            Ok(guard) => {
                let registry = self.registry.clone();
                detached(guard, async move {
                    registry
                        .update_guest(id, &name, phone.as_deref(), email.as_deref())
                        .await
                })
                .await
            }
            Err(e) => Err(e),
        };
        record_op("update_guest", &result, started);
        result
    }

    /// Refused while any reservation references the guest.
    pub async fn delete_guest(&self, id: GuestId) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = match self.locks.catalog().await {
            Ok(guard) => {
                let registry = self.registry.clone();
                detached(guard, async move { registry.delete_guest(id).await }).await
            }
            Err(e) => Err(e),
        };
        record_op("delete_guest", &result, started);
        result
    }
}

fn owned_room(number: &str, room_type: &str, description: Option<&str>) -> (String, String, Option<String>) {
    (number.to_string(), room_type.to_string(), description.map(str::to_string))
}

fn owned_guest(name: &str, phone: Option<&str>, email: Option<&str>) -> (String, Option<String>, Option<String>) {
    (name.to_string(), phone.map(str::to_string), email.map(str::to_string))
}
