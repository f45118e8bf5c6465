use rust_decimal::Decimal;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Today's calendar day in local time.
pub(crate) fn today() -> Day {
    day_from_date(chrono::Local::now().date_naive())
}

pub(crate) fn validate_stay(stay: &Stay) -> Result<(), EngineError> {
    if stay.start < MIN_VALID_DAY || stay.end > MAX_VALID_DAY {
        return Err(EngineError::LimitExceeded("date out of range"));
    }
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

pub(crate) fn validate_window(stay: &Stay) -> Result<(), EngineError> {
    if stay.start < MIN_VALID_DAY || stay.end > MAX_VALID_DAY {
        return Err(EngineError::LimitExceeded("date out of range"));
    }
    if stay.nights() > MAX_QUERY_WINDOW_DAYS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

pub(crate) fn check_no_conflict(book: &RoomBook, room_id: RoomId, stay: &Stay) -> Result<(), EngineError> {
    match book.first_conflict(stay) {
        Some(existing) => Err(EngineError::RoomUnavailable {
            room: room_id,
            conflicting: existing.id,
            stay: existing.stay,
        }),
        None => Ok(()),
    }
}

/// Flat nightly pricing. Fails rather than overflowing.
pub(crate) fn price(rate: Decimal, stay: &Stay) -> Result<Decimal, EngineError> {
    rate.checked_mul(Decimal::from(stay.nights()))
        .ok_or(EngineError::LimitExceeded("total price too large"))
}
