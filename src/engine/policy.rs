use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{committed_demand, find_slot_conflict, Probe};
use super::EngineError;

/// An incoming booking request as decoded at the HTTP boundary. Which fields
/// are required depends on the venue kind; the policy decides.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub venue_id: Ulid,
    /// Seating instant (restaurant).
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
    /// Calendar date (activity, service).
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Slot start (service).
    #[serde(default)]
    pub start: Option<NaiveTime>,
    /// Slot length in whole hours (service).
    #[serde(default)]
    pub hours: Option<u32>,
    /// Pax, tickets or participants; services leave it out.
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// A validated request, normalized into the fields the engine persists.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingDraft {
    pub slot: BookingSlot,
    pub quantity: u32,
    pub total_price: Option<Decimal>,
}

/// Kind-specific business rules: validation + pricing + status vocabulary +
/// withdrawal rights. One engine, four policies.
pub trait BookingPolicy: Send + Sync {
    fn kind(&self) -> VenueKind;

    /// Accept or reject a proposed booking against the venue's constraints
    /// and its existing bookings. `exclude` skips one booking when
    /// re-validating an edit. Restaurant validation collects every violation;
    /// the other kinds stop at the first.
    fn validate(
        &self,
        venue: &Venue,
        bookings: &[Booking],
        req: &BookingRequest,
        exclude: Option<Ulid>,
        now: DateTime<Utc>,
    ) -> Result<BookingDraft, EngineError>;

    /// Kind-facing name for an internal status.
    fn display_status(&self, status: BookingStatus) -> &'static str;

    /// Whether bookings of this kind can be withdrawn at all (from pending or
    /// accepted). Restaurants only know approve/reject plus requester delete.
    fn supports_withdrawal(&self) -> bool {
        true
    }
}

pub fn policy_for(kind: VenueKind) -> &'static dyn BookingPolicy {
    match kind {
        VenueKind::Restaurant => &DiningPolicy,
        VenueKind::Event => &TicketPolicy,
        VenueKind::Activity => &ActivityPolicy,
        VenueKind::Service => &ServicePolicy,
    }
}

fn quantity_or_zero(req: &BookingRequest) -> u32 {
    req.quantity.unwrap_or(0)
}

// ── Restaurant ───────────────────────────────────────────────────

/// Table seatings. Checks every rule and reports all violations together.
pub struct DiningPolicy;

impl BookingPolicy for DiningPolicy {
    fn kind(&self) -> VenueKind {
        VenueKind::Restaurant
    }

    fn validate(
        &self,
        venue: &Venue,
        _bookings: &[Booking],
        req: &BookingRequest,
        _exclude: Option<Ulid>,
        now: DateTime<Utc>,
    ) -> Result<BookingDraft, EngineError> {
        let VenueRules::Restaurant { max_pax, opens_at, closes_at, closed_days } = &venue.rules
        else {
            return Err(EngineError::Unsupported("venue is not a restaurant"));
        };

        let mut violations: Vec<String> = Vec::new();

        let pax = quantity_or_zero(req);
        if pax == 0 {
            violations.push("party size must be at least 1".into());
        }
        if pax > *max_pax {
            violations.push(format!("party size exceeds the table limit of {max_pax}"));
        }
        if pax > MAX_PARTY_SIZE {
            violations.push(format!(
                "parties larger than {MAX_PARTY_SIZE} must contact the venue directly"
            ));
        }

        match req.at {
            None => violations.push("a seating time is required".into()),
            Some(at) => {
                if at <= now {
                    violations.push("seating time must be in the future".into());
                } else if at > now + booking_horizon() {
                    violations.push(format!(
                        "seatings open at most {BOOKING_HORIZON_DAYS} days in advance"
                    ));
                }
                if closed_days.contains(&at.weekday()) {
                    violations.push("the venue is closed on that day".into());
                }
                let t = at.time();
                if t < *opens_at || t >= *closes_at {
                    violations.push("outside opening hours".into());
                }
            }
        }

        match (violations.is_empty(), req.at) {
            (true, Some(at)) => Ok(BookingDraft {
                slot: BookingSlot::At(at),
                quantity: pax,
                total_price: None,
            }),
            _ => Err(EngineError::Rejected(violations)),
        }
    }

    fn display_status(&self, status: BookingStatus) -> &'static str {
        match status {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "approved",
            BookingStatus::Declined => "rejected",
            BookingStatus::Withdrawn => "cancelled",
        }
    }

    fn supports_withdrawal(&self) -> bool {
        false
    }
}

// ── Event ────────────────────────────────────────────────────────

/// Ticket sales against a lifetime capacity ceiling. First failure wins.
pub struct TicketPolicy;

impl BookingPolicy for TicketPolicy {
    fn kind(&self) -> VenueKind {
        VenueKind::Event
    }

    fn validate(
        &self,
        venue: &Venue,
        bookings: &[Booking],
        req: &BookingRequest,
        exclude: Option<Ulid>,
        _now: DateTime<Utc>,
    ) -> Result<BookingDraft, EngineError> {
        let VenueRules::Event { max_capacity, ticket_price } = &venue.rules else {
            return Err(EngineError::Unsupported("venue is not an event"));
        };

        let tickets = quantity_or_zero(req);
        if tickets == 0 {
            return Err(EngineError::rejected("ticket count must be at least 1"));
        }
        if tickets > MAX_QUANTITY {
            return Err(EngineError::LimitExceeded("ticket count too large"));
        }

        let committed = committed_demand(bookings, &Probe::Lifetime, exclude);
        if committed + tickets > *max_capacity {
            return Err(EngineError::rejected("Not enough tickets available"));
        }

        Ok(BookingDraft {
            slot: BookingSlot::Lifetime,
            quantity: tickets,
            total_price: Some(*ticket_price * Decimal::from(tickets)),
        })
    }

    fn display_status(&self, status: BookingStatus) -> &'static str {
        confirmed_vocabulary(status)
    }
}

// ── Activity ─────────────────────────────────────────────────────

/// Guided activities: enumerated valid dates, per-date participant ceiling.
pub struct ActivityPolicy;

impl BookingPolicy for ActivityPolicy {
    fn kind(&self) -> VenueKind {
        VenueKind::Activity
    }

    fn validate(
        &self,
        venue: &Venue,
        bookings: &[Booking],
        req: &BookingRequest,
        exclude: Option<Ulid>,
        _now: DateTime<Utc>,
    ) -> Result<BookingDraft, EngineError> {
        let VenueRules::Activity { capacity, price_per_person, dates } = &venue.rules else {
            return Err(EngineError::Unsupported("venue is not an activity"));
        };

        let participants = quantity_or_zero(req);
        if participants == 0 {
            return Err(EngineError::rejected("participant count must be at least 1"));
        }
        if participants > MAX_QUANTITY {
            return Err(EngineError::LimitExceeded("participant count too large"));
        }

        let date = req
            .date
            .ok_or_else(|| EngineError::rejected("a date is required"))?;
        if !dates.contains(&date) {
            return Err(EngineError::rejected("not available for this date"));
        }

        let committed = committed_demand(bookings, &Probe::Day(date), exclude);
        if committed + participants > *capacity {
            return Err(EngineError::rejected("Not enough capacity"));
        }

        Ok(BookingDraft {
            slot: BookingSlot::Day(date),
            quantity: participants,
            total_price: Some(*price_per_person * Decimal::from(participants)),
        })
    }

    fn display_status(&self, status: BookingStatus) -> &'static str {
        confirmed_vocabulary(status)
    }
}

// ── Service ──────────────────────────────────────────────────────

/// Hourly services: no capacity ceiling, but slots on a date must not overlap.
pub struct ServicePolicy;

impl BookingPolicy for ServicePolicy {
    fn kind(&self) -> VenueKind {
        VenueKind::Service
    }

    fn validate(
        &self,
        venue: &Venue,
        bookings: &[Booking],
        req: &BookingRequest,
        exclude: Option<Ulid>,
        _now: DateTime<Utc>,
    ) -> Result<BookingDraft, EngineError> {
        let VenueRules::Service { hourly_rate } = &venue.rules else {
            return Err(EngineError::Unsupported("venue is not a service"));
        };

        let date = req
            .date
            .ok_or_else(|| EngineError::rejected("a date is required"))?;
        let start = req
            .start
            .ok_or_else(|| EngineError::rejected("a start time is required"))?;
        let hours = req
            .hours
            .ok_or_else(|| EngineError::rejected("a duration is required"))?;
        if hours == 0 {
            return Err(EngineError::rejected("duration must be at least 1 hour"));
        }
        if hours > MAX_SERVICE_HOURS {
            return Err(EngineError::LimitExceeded("service slot too long"));
        }

        let span = SlotSpan::from_time(start, hours);
        if span.end > 24 * 60 {
            return Err(EngineError::rejected("slot must end by midnight"));
        }

        if find_slot_conflict(bookings, date, &span, exclude).is_some() {
            return Err(EngineError::rejected("time slot already booked"));
        }

        Ok(BookingDraft {
            slot: BookingSlot::Window { date, start, hours },
            quantity: 1,
            total_price: Some(*hourly_rate * Decimal::from(hours)),
        })
    }

    fn display_status(&self, status: BookingStatus) -> &'static str {
        confirmed_vocabulary(status)
    }
}

fn confirmed_vocabulary(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Pending => "pending",
        BookingStatus::Accepted => "confirmed",
        BookingStatus::Declined | BookingStatus::Withdrawn => "cancelled",
    }
}
