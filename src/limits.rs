//! Hard limits on inputs and state size. Kept in one place so the engine's
//! refusal messages and the tests agree on the numbers.

use chrono::Duration;

/// Absolute ceiling on a restaurant party; larger groups are told to contact
/// the venue directly, whatever the table limit says.
pub const MAX_PARTY_SIZE: u32 = 10;

/// Restaurant seatings may be requested at most this far ahead.
pub const BOOKING_HORIZON_DAYS: i64 = 14;

pub fn booking_horizon() -> Duration {
    Duration::days(BOOKING_HORIZON_DAYS)
}

/// Decline/cancel reasons are bounded; longer ones are rejected outright.
pub const MAX_REASON_LEN: usize = 200;

/// Placeholder stored when an owner declines or cancels without a reason.
pub const DEFAULT_REASON: &str = "No reason provided";

pub const MAX_NAME_LEN: usize = 256;

/// Upper bound on any single quantity (tickets, participants).
pub const MAX_QUANTITY: u32 = 100_000;

/// A service slot cannot run longer than a day.
pub const MAX_SERVICE_HOURS: u32 = 24;

/// An activity cannot enumerate more than a year of dates.
pub const MAX_ACTIVITY_DATES: usize = 366;

pub const MAX_VENUES: usize = 100_000;

pub const MAX_BOOKINGS_PER_VENUE: usize = 100_000;

/// Longest accepted bearer token in the auth registry.
pub const MAX_TOKEN_LEN: usize = 256;
