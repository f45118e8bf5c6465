use std::fmt;

use rust_decimal::Decimal;

use crate::model::*;
use crate::store::StoreError;

/// The record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Guest(GuestId),
    Room(RoomId),
    Reservation(ReservationId),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Guest(id) => write!(f, "guest {id}"),
            Entity::Room(id) => write!(f, "room {id}"),
            Entity::Reservation(id) => write!(f, "reservation {id}"),
        }
    }
}

/// Which exclusivity token timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Catalog,
    Room(RoomId),
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockScope::Catalog => f.write_str("catalog"),
            LockScope::Room(id) => write!(f, "room {id}"),
        }
    }
}

fn iso(day: &Day) -> String {
    format_day(*day)
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid range: check-out {} must be after check-in {}", iso(.end), iso(.start))]
    InvalidRange { start: Day, end: Day },
    #[error("invalid date {0:?}: expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("not found: {0}")]
    NotFound(Entity),
    #[error("room {room} unavailable: reservation {conflicting} already holds {stay}")]
    RoomUnavailable {
        room: RoomId,
        conflicting: ReservationId,
        stay: Stay,
    },
    #[error("room number {0:?} already registered")]
    DuplicateRoom(String),
    #[error("{0} is busy, retry later")]
    Busy(LockScope),
    #[error("invalid nightly rate {0}: expected 0 to 99999999.99 with at most two decimals")]
    InvalidRate(Decimal),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("reservation {id} is {from}, cannot become {to}")]
    InvalidTransition {
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    #[error("{0} still has reservations")]
    HasReservations(Entity),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("operation aborted: {0}")]
    Aborted(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl EngineError {
    /// Only lock contention is safe to retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Busy(_))
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::InvalidRange { .. } => "invalid_range",
            EngineError::InvalidDate(_) => "invalid_date",
            EngineError::NotFound(_) => "not_found",
            EngineError::RoomUnavailable { .. } => "room_unavailable",
            EngineError::DuplicateRoom(_) => "duplicate_room",
            EngineError::Busy(_) => "busy",
            EngineError::InvalidRate(_) => "invalid_rate",
            EngineError::MissingField(_) => "missing_field",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::HasReservations(_) => "has_reservations",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Aborted(_) => "aborted",
            EngineError::Storage(_) => "storage",
        }
    }
}
