use crate::model::Day;

pub const MAX_GUEST_NAME_LEN: usize = 100;
pub const MAX_PHONE_LEN: usize = 20;
pub const MAX_EMAIL_LEN: usize = 100;
pub const MAX_ROOM_NUMBER_LEN: usize = 16;
pub const MAX_ROOM_TYPE_LEN: usize = 50;
pub const MAX_DESCRIPTION_LEN: usize = 2_000;

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_RESERVATIONS_PER_ROOM: usize = 100_000;

/// 1970-01-01.
pub const MIN_VALID_DAY: Day = 0;
/// 9999-12-31.
pub const MAX_VALID_DAY: Day = 2_932_896;

/// Nightly rates are stored with cents precision and stay below this many whole units.
pub const MAX_RATE_UNITS: i64 = 100_000_000;
pub const MAX_RATE_SCALE: u32 = 2;

pub const MAX_STAY_NIGHTS: u32 = 366;
pub const MAX_QUERY_WINDOW_DAYS: u32 = 3_660;
