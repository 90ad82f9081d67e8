use chrono::{DateTime, NaiveDate, Utc};
use ulid::Ulid;

use crate::model::*;

// ── Demand Algorithm ─────────────────────────────────────────────

/// Temporal scope for a demand query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Probe {
    /// Everything the venue has ever committed (events).
    Lifetime,
    /// One calendar date (activities).
    Day(NaiveDate),
    /// Half-open instant window (restaurant listings).
    Window { from: DateTime<Utc>, to: DateTime<Utc> },
    /// Time slot on one date (services).
    Slot { date: NaiveDate, span: SlotSpan },
}

fn probe_matches(probe: &Probe, slot: &BookingSlot) -> bool {
    match (probe, slot) {
        (Probe::Lifetime, _) => true,
        (Probe::Day(date), BookingSlot::Day(booked)) => date == booked,
        (Probe::Window { from, to }, BookingSlot::At(at)) => from <= at && at < to,
        (Probe::Slot { date, span }, BookingSlot::Window { .. }) => {
            // `window()` is Some by construction for Window slots
            slot.window()
                .is_some_and(|(booked_date, booked)| *date == booked_date && span.overlaps(&booked))
        }
        _ => false,
    }
}

/// Sum quantities of capacity-committing bookings intersecting the probe.
/// `exclude` skips one booking — used when re-validating an edit against
/// everything but itself.
pub fn committed_demand(bookings: &[Booking], probe: &Probe, exclude: Option<Ulid>) -> u32 {
    bookings
        .iter()
        .filter(|b| b.status.commits_capacity())
        .filter(|b| exclude != Some(b.id))
        .filter(|b| probe_matches(probe, &b.slot))
        .map(|b| b.quantity)
        .sum()
}

/// Committed demand against the venue's capacity ceiling. Kinds without an
/// aggregate ceiling (restaurant, service) report no `capacity`/`remaining`
/// and are never "full" — their limits are per-booking or slot-shaped.
pub fn availability_of(venue: &Venue, bookings: &[Booking], probe: &Probe) -> Availability {
    let committed = committed_demand(bookings, probe, None);
    let capacity = match &venue.rules {
        VenueRules::Event { max_capacity, .. } => Some(*max_capacity),
        VenueRules::Activity { capacity, .. } => Some(*capacity),
        VenueRules::Restaurant { .. } | VenueRules::Service { .. } => None,
    };
    let remaining = capacity.map(|c| c.saturating_sub(committed));
    Availability {
        capacity,
        committed,
        remaining,
        is_full: remaining == Some(0),
    }
}

/// First capacity-committing booking whose slot overlaps `span` on `date`.
/// Half-open arithmetic: spans touching at a boundary do not conflict.
pub fn find_slot_conflict<'a>(
    bookings: &'a [Booking],
    date: NaiveDate,
    span: &SlotSpan,
    exclude: Option<Ulid>,
) -> Option<&'a Booking> {
    bookings
        .iter()
        .filter(|b| b.status.commits_capacity())
        .filter(|b| exclude != Some(b.id))
        .find(|b| {
            b.slot
                .window()
                .is_some_and(|(booked_date, booked)| booked_date == date && span.overlaps(&booked))
        })
}
