use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::limits::*;
use crate::model::*;
use crate::store::{Storage, Txn};

use super::conflict::validate_window;
use super::{Clock, EngineError, Entity};

/// Rooms and guests. Callers hold the catalog lock for every mutation here except
/// `set_status`, which runs under the room's own lock.
pub(crate) struct Registry {
    store: Arc<dyn Storage>,
    clock: Clock,
}

impl Registry {
    pub(crate) fn new(store: Arc<dyn Storage>, clock: Clock) -> Self {
        Self { store, clock }
    }

    // ── Rooms ────────────────────────────────────────────────

    pub async fn register(
        &self,
        number: &str,
        room_type: &str,
        rate: Decimal,
        description: Option<&str>,
    ) -> Result<RoomId, EngineError> {
        let (number, room_type, description) = validate_room(number, room_type, rate, description)?;
        let rooms = self.store.load_rooms().await?;
        if rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if rooms.iter().any(|r| same_number(&r.number, &number)) {
            return Err(EngineError::DuplicateRoom(number));
        }

        let room = Room {
            id: RoomId::new(),
            number,
            room_type,
            rate,
            description,
            status: RoomStatus::Free,
        };
        let id = room.id;
        info!("room {} registered as {id} at {}/night", room.number, room.rate);
        let mut txn = Txn::catalog();
        txn.save_room(room);
        self.store.commit(txn).await?;
        Ok(id)
    }

    pub async fn get(&self, id: RoomId) -> Result<Room, EngineError> {
        self.store
            .load_room(id)
            .await?
            .ok_or(EngineError::NotFound(Entity::Room(id)))
    }

    /// All rooms ordered by number; `filter` matches number, type or status, ignoring case.
    pub async fn list(&self, filter: Option<&str>) -> Result<Vec<Room>, EngineError> {
        let mut rooms = self.store.load_rooms().await?;
        if let Some(needle) = normalized_filter(filter) {
            rooms.retain(|room| {
                room.number.to_lowercase().contains(&needle)
                    || room.room_type.to_lowercase().contains(&needle)
                    || room.status.to_string().to_lowercase().contains(&needle)
            });
        }
        rooms.sort_by(|a, b| number_key(&a.number).cmp(&number_key(&b.number)));
        Ok(rooms)
    }

    /// Cached occupancy write. Only the allocation path calls this, under the room lock.
    pub(crate) async fn set_status(&self, id: RoomId, status: RoomStatus) -> Result<(), EngineError> {
        let room = self.get(id).await?;
        if room.status == status {
            return Ok(());
        }
        let mut txn = Txn::for_room(id);
        txn.update_room_status(id, status);
        self.store.commit(txn).await?;
        debug!("room {} {} -> {status}", room.number, room.status);
        Ok(())
    }

    /// Rooms with no ACTIVE reservation overlapping `stay`.
    pub async fn list_available(&self, stay: &Stay) -> Result<Vec<Room>, EngineError> {
        validate_window(stay)?;
        let mut available = Vec::new();
        for room in self.list(None).await? {
            let book = RoomBook::new(self.store.load_reservations_for_room(room.id).await?);
            if book.first_conflict(stay).is_none() {
                available.push(room);
            }
        }
        Ok(available)
    }

    /// Edit number, type, rate, description. Status is never set from here and
    /// totals of existing reservations are left as booked.
    pub async fn update(
        &self,
        id: RoomId,
        number: &str,
        room_type: &str,
        rate: Decimal,
        description: Option<&str>,
    ) -> Result<Room, EngineError> {
        let existing = self.get(id).await?;
        let (number, room_type, description) = validate_room(number, room_type, rate, description)?;
        let rooms = self.store.load_rooms().await?;
        if rooms.iter().any(|r| r.id != id && same_number(&r.number, &number)) {
            return Err(EngineError::DuplicateRoom(number));
        }

        let room = Room {
            id,
            number,
            room_type,
            rate,
            description,
            status: existing.status,
        };
        let mut txn = Txn::catalog();
        txn.save_room(room.clone());
        self.store.commit(txn).await?;
        info!("room {id} updated");
        Ok(room)
    }

    /// Refused while any reservation (in any status) references the room.
    pub async fn delete(&self, id: RoomId) -> Result<(), EngineError> {
        let room = self.get(id).await?;
        if !self.store.load_reservations_for_room(id).await?.is_empty() {
            return Err(EngineError::HasReservations(Entity::Room(id)));
        }
        let mut txn = Txn::catalog();
        txn.delete_room(id);
        self.store.commit(txn).await?;
        info!("room {} ({id}) deleted", room.number);
        Ok(())
    }

    // ── Guests ───────────────────────────────────────────────

    pub async fn register_guest(
        &self,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<GuestId, EngineError> {
        let (name, phone, email) = validate_guest(name, phone, email)?;
        let guest = Guest {
            id: GuestId::new(),
            name,
            phone,
            email,
            registered_on: (self.clock)(),
        };
        let id = guest.id;
        info!("guest {id} registered");
        let mut txn = Txn::catalog();
        txn.save_guest(guest);
        self.store.commit(txn).await?;
        Ok(id)
    }

    pub async fn get_guest(&self, id: GuestId) -> Result<Guest, EngineError> {
        self.store
            .load_guest(id)
            .await?
            .ok_or(EngineError::NotFound(Entity::Guest(id)))
    }

    /// Guests ordered by name; `filter` matches name, email or phone, ignoring case.
    pub async fn list_guests(&self, filter: Option<&str>) -> Result<Vec<Guest>, EngineError> {
        let mut guests = self.store.load_guests().await?;
        if let Some(needle) = normalized_filter(filter) {
            guests.retain(|g| {
                g.name.to_lowercase().contains(&needle)
                    || g.email.as_deref().is_some_and(|e| e.to_lowercase().contains(&needle))
                    || g.phone.as_deref().is_some_and(|p| p.contains(&needle))
            });
        }
        guests.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then(a.id.cmp(&b.id)));
        Ok(guests)
    }

    pub async fn update_guest(
        &self,
        id: GuestId,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<Guest, EngineError> {
        let existing = self.get_guest(id).await?;
        let (name, phone, email) = validate_guest(name, phone, email)?;
        let guest = Guest {
            id,
            name,
            phone,
            email,
            registered_on: existing.registered_on,
        };
        let mut txn = Txn::catalog();
        txn.save_guest(guest.clone());
        self.store.commit(txn).await?;
        info!("guest {id} updated");
        Ok(guest)
    }

    /// Refused while any reservation references the guest.
    pub async fn delete_guest(&self, id: GuestId) -> Result<(), EngineError> {
        self.get_guest(id).await?;
        let referenced = self
            .store
            .load_reservations()
            .await?
            .iter()
            .any(|r| r.guest_id == id);
        if referenced {
            return Err(EngineError::HasReservations(Entity::Guest(id)));
        }
        let mut txn = Txn::catalog();
        txn.delete_guest(id);
        self.store.commit(txn).await?;
        info!("guest {id} deleted");
        Ok(())
    }
}

fn same_number(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Numeric room numbers first, in numeric order; the rest lexicographically.
fn number_key(number: &str) -> (bool, u64, &str) {
    match number.parse::<u64>() {
        Ok(n) => (false, n, number),
        Err(_) => (true, 0, number),
    }
}

pub(crate) fn normalized_filter(filter: Option<&str>) -> Option<String> {
    filter
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_lowercase)
}

fn required(value: &str, field: &'static str, max_len: usize, too_long: &'static str) -> Result<String, EngineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::MissingField(field));
    }
    if value.len() > max_len {
        return Err(EngineError::LimitExceeded(too_long));
    }
    Ok(value.to_string())
}

fn optional(value: Option<&str>, max_len: usize, too_long: &'static str) -> Result<Option<String>, EngineError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) if v.len() > max_len => Err(EngineError::LimitExceeded(too_long)),
        Some(v) => Ok(Some(v.to_string())),
        None => Ok(None),
    }
}

/// Cents precision, below `MAX_RATE_UNITS`. Trailing zeros do not count towards the scale.
fn valid_rate(rate: Decimal) -> bool {
    rate >= Decimal::ZERO && rate < Decimal::from(MAX_RATE_UNITS) && rate.normalize().scale() <= MAX_RATE_SCALE
}

fn validate_room(
    number: &str,
    room_type: &str,
    rate: Decimal,
    description: Option<&str>,
) -> Result<(String, String, Option<String>), EngineError> {
    let number = required(number, "number", MAX_ROOM_NUMBER_LEN, "room number too long")?;
    let room_type = required(room_type, "room_type", MAX_ROOM_TYPE_LEN, "room type too long")?;
    if !valid_rate(rate) {
        return Err(EngineError::InvalidRate(rate));
    }
    let description = optional(description, MAX_DESCRIPTION_LEN, "description too long")?;
    Ok((number, room_type, description))
}

fn validate_guest(
    name: &str,
    phone: Option<&str>,
    email: Option<&str>,
) -> Result<(String, Option<String>, Option<String>), EngineError> {
    Ok((
        required(name, "name", MAX_GUEST_NAME_LEN, "guest name too long")?,
        optional(phone, MAX_PHONE_LEN, "phone too long")?,
        optional(email, MAX_EMAIL_LEN, "email too long")?,
    ))
}
