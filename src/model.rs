use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Calendar day counted from 1970-01-01.
pub type Day = i32;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Half-open overlap: `[a_start, a_end)` and `[b_start, b_end)` share at least one day.
pub fn overlaps(a_start: Day, a_end: Day, b_start: Day, b_end: Day) -> bool {
    a_start < b_end && b_start < a_end
}

/// Number of nights in `[start, end)`.
pub fn nights(start: Day, end: Day) -> Result<u32, EngineError> {
    if end <= start {
        return Err(EngineError::InvalidRange { start, end });
    }
    Ok(span(start, end))
}

/// Widened so the full `Day` range cannot overflow; `i32::MAX - i32::MIN` fits a `u32`.
fn span(start: Day, end: Day) -> u32 {
    (i64::from(end) - i64::from(start)) as u32
}

pub fn day_from_date(date: NaiveDate) -> Day {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

pub fn date_from_day(day: Day) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(day.checked_add(EPOCH_DAYS_FROM_CE)?)
}

/// Parse an ISO-8601 calendar date (`YYYY-MM-DD`).
pub fn parse_day(s: &str) -> Result<Day, EngineError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map(day_from_date)
        .map_err(|_| EngineError::InvalidDate(s.to_string()))
}

pub fn format_day(day: Day) -> String {
    match date_from_day(day) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => format!("day {day}"),
    }
}

/// Half-open stay `[start, end)`: check-in day included, check-out day excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub start: Day,
    pub end: Day,
}

impl Stay {
    pub fn new(start: Day, end: Day) -> Result<Self, EngineError> {
        nights(start, end)?;
        Ok(Self { start, end })
    }

    pub fn nights(&self) -> u32 {
        span(self.start, self.end)
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    pub fn contains_day(&self, day: Day) -> bool {
        self.start <= day && day < self.end
    }
}

impl fmt::Display for Stay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", format_day(self.start), format_day(self.end))
    }
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Ulid);

        impl $name {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(s.trim()).map(Self)
            }
        }
    };
}

entity_id!(GuestId);
entity_id!(RoomId);
entity_id!(ReservationId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Free,
    Occupied,
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoomStatus::Free => "FREE",
            RoomStatus::Occupied => "OCCUPIED",
        })
    }
}

/// `Active` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    Cancelled,
    Finalized,
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Finalized => "FINALIZED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub id: GuestId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub registered_on: Day,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub number: String,
    pub room_type: String,
    /// Nightly rate.
    pub rate: Decimal,
    pub description: Option<String>,
    /// Cached occupancy; kept in step with the room's ACTIVE reservations by the engine.
    pub status: RoomStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub guest_id: GuestId,
    pub room_id: RoomId,
    pub stay: Stay,
    /// `rate × nights` at creation time; never recomputed.
    pub total: Decimal,
    pub status: ReservationStatus,
    pub created_on: Day,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

/// All reservations of one room, sorted by `stay.start`.
#[derive(Debug, Clone, Default)]
pub struct RoomBook {
    pub reservations: Vec<Reservation>,
}

impl RoomBook {
    pub fn new(mut reservations: Vec<Reservation>) -> Self {
        reservations.sort_by_key(|r| r.stay.start);
        Self { reservations }
    }

    /// Insert maintaining sort order by stay.start.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.stay.start, |r| r.stay.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Returns the previous status, or `None` if the reservation is not in this book.
    pub fn set_status(&mut self, id: ReservationId, status: ReservationStatus) -> Option<ReservationStatus> {
        let reservation = self.reservations.iter_mut().find(|r| r.id == id)?;
        Some(std::mem::replace(&mut reservation.status, status))
    }

    /// Reservations (any status) whose stay overlaps `query`.
    /// Uses binary search to skip stays starting at or after `query.end`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.stay.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.stay.end > query.start)
    }

    /// First ACTIVE reservation colliding with `query`.
    pub fn first_conflict(&self, query: &Stay) -> Option<&Reservation> {
        self.overlapping(query).find(|r| r.is_active())
    }

    pub fn active(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(|r| r.is_active())
    }

    /// Occupancy derived from the reservation set: OCCUPIED iff an ACTIVE stay contains `today`.
    pub fn occupancy_on(&self, today: Day) -> RoomStatus {
        if self.active().any(|r| r.stay.contains_day(today)) {
            RoomStatus::Occupied
        } else {
            RoomStatus::Free
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

/// A single write. A committed batch of these is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    GuestSaved(Guest),
    GuestDeleted {
        id: GuestId,
    },
    RoomSaved(Room),
    RoomDeleted {
        id: RoomId,
    },
    RoomStatusChanged {
        id: RoomId,
        status: RoomStatus,
    },
    ReservationInserted(Reservation),
    ReservationStatusChanged {
        id: ReservationId,
        status: ReservationStatus,
    },
}

// ── Query result types ───────────────────────────────────────────

/// Outcome of a status transition. `Unchanged` is the idempotent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Applied,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub number: String,
    pub room_type: String,
    pub rate: Decimal,
    pub status: RoomStatus,
    pub description: Option<String>,
}

impl From<&Room> for RoomSummary {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id,
            number: room.number.clone(),
            room_type: room.room_type.clone(),
            rate: room.rate,
            status: room.status,
            description: room.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingReceipt {
    pub reservation_id: ReservationId,
    pub room_id: RoomId,
    pub nights: u32,
    pub total: Decimal,
}

impl From<&Reservation> for BookingReceipt {
    fn from(r: &Reservation) -> Self {
        Self {
            reservation_id: r.id,
            room_id: r.room_id,
            nights: r.stay.nights(),
            total: r.total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub guests: usize,
    pub rooms: usize,
    pub reservations: usize,
    pub free_rooms: usize,
}
