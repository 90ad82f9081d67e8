use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// The acting caller, resolved by the auth layer before the engine runs.
/// Every engine operation takes one explicitly — there is no ambient
/// request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Ulid,
    /// May create and administer venues.
    pub is_owner: bool,
    pub is_admin: bool,
}

impl Principal {
    pub fn user(id: Ulid) -> Self {
        Self { id, is_owner: false, is_admin: false }
    }

    pub fn owner(id: Ulid) -> Self {
        Self { id, is_owner: true, is_admin: false }
    }

    pub fn admin(id: Ulid) -> Self {
        Self { id, is_owner: true, is_admin: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueKind {
    Restaurant,
    Event,
    Activity,
    Service,
}

impl std::fmt::Display for VenueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VenueKind::Restaurant => "restaurant",
            VenueKind::Event => "event",
            VenueKind::Activity => "activity",
            VenueKind::Service => "service",
        };
        f.write_str(s)
    }
}

/// Per-kind capacity, price and schedule constraints. Externally tagged so
/// the WAL's bincode encoding stays self-contained; the JSON shape lives in
/// the HTTP layer's DTOs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VenueRules {
    Restaurant {
        /// Largest party a single table seating can take.
        max_pax: u32,
        opens_at: NaiveTime,
        closes_at: NaiveTime,
        closed_days: Vec<Weekday>,
    },
    Event {
        /// Ticket ceiling over the event's whole lifetime.
        max_capacity: u32,
        ticket_price: Decimal,
    },
    Activity {
        /// Participant ceiling per calendar date.
        capacity: u32,
        price_per_person: Decimal,
        /// The only dates this activity runs on.
        dates: Vec<NaiveDate>,
    },
    Service {
        hourly_rate: Decimal,
    },
}

impl VenueRules {
    pub fn kind(&self) -> VenueKind {
        match self {
            VenueRules::Restaurant { .. } => VenueKind::Restaurant,
            VenueRules::Event { .. } => VenueKind::Event,
            VenueRules::Activity { .. } => VenueKind::Activity,
            VenueRules::Service { .. } => VenueKind::Service,
        }
    }
}

/// A bookable resource owned by exactly one principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: Ulid,
    pub owner: Ulid,
    pub name: String,
    pub rules: VenueRules,
}

impl Venue {
    pub fn kind(&self) -> VenueKind {
        self.rules.kind()
    }
}

/// Half-open interval `[start, end)` in minutes from midnight. Service
/// bookings on the same date conflict iff their spans overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpan {
    pub start: u32,
    pub end: u32,
}

impl SlotSpan {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start < end, "SlotSpan start must be before end");
        Self { start, end }
    }

    pub fn from_time(start: NaiveTime, hours: u32) -> Self {
        let start_min = start.num_seconds_from_midnight() / 60;
        Self::new(start_min, start_min + hours * 60)
    }

    pub fn duration_min(&self) -> u32 {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &SlotSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Temporal anchor of a booking; the shape differs per venue kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingSlot {
    /// Restaurant seating instant.
    At(DateTime<Utc>),
    /// Event tickets — valid for the event's whole lifetime.
    Lifetime,
    /// Activity calendar date.
    Day(NaiveDate),
    /// Service time slot on one date.
    Window {
        date: NaiveDate,
        start: NaiveTime,
        hours: u32,
    },
}

impl BookingSlot {
    /// Date and minute span for service-style slots, `None` otherwise.
    pub fn window(&self) -> Option<(NaiveDate, SlotSpan)> {
        match self {
            BookingSlot::Window { date, start, hours } => {
                Some((*date, SlotSpan::from_time(*start, *hours)))
            }
            _ => None,
        }
    }
}

/// Internal status vocabulary. The kind-facing names (`approved/rejected`
/// for restaurants, `confirmed/cancelled` for the rest) live in the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    /// Positive terminal (approve/confirm). Withdrawable for some kinds.
    Accepted,
    /// Negative terminal set by the owner (reject/cancel with reason).
    Declined,
    /// Cancellation, from pending or accepted.
    Withdrawn,
}

impl BookingStatus {
    /// Pending and accepted bookings count toward committed demand.
    pub fn commits_capacity(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Accepted)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Declined | BookingStatus::Withdrawn)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub requester: Ulid,
    pub slot: BookingSlot,
    /// Pax, tickets or participants; always 1 for services.
    pub quantity: u32,
    /// Computed at validation time; restaurants carry no price.
    pub total_price: Option<Decimal>,
    pub status: BookingStatus,
    /// Reason recorded on decline/withdraw.
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable per-venue state: the venue record plus all of its bookings.
/// One `RwLock` around a `VenueState` is the engine's unit of serialization —
/// check-and-insert for a venue always runs under its write lock.
#[derive(Debug, Clone)]
pub struct VenueState {
    pub venue: Venue,
    pub bookings: Vec<Booking>,
}

impl VenueState {
    pub fn new(venue: Venue) -> Self {
        Self { venue, bookings: Vec::new() }
    }

    pub fn insert_booking(&mut self, booking: Booking) {
        self.bookings.push(booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    /// Bookings that count toward committed demand.
    pub fn committed(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter().filter(|b| b.status.commits_capacity())
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    VenueCreated {
        venue: Venue,
    },
    VenueUpdated {
        id: Ulid,
        name: String,
        rules: VenueRules,
    },
    VenueDeleted {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingEdited {
        id: Ulid,
        venue_id: Ulid,
        slot: BookingSlot,
        quantity: u32,
        total_price: Option<Decimal>,
        updated_at: DateTime<Utc>,
    },
    BookingStatusChanged {
        id: Ulid,
        venue_id: Ulid,
        status: BookingStatus,
        reason: Option<String>,
        updated_at: DateTime<Utc>,
    },
    BookingDeleted {
        id: Ulid,
        venue_id: Ulid,
    },
}

impl Event {
    /// The venue an event belongs to.
    pub fn venue_id(&self) -> Ulid {
        match self {
            Event::VenueCreated { venue } => venue.id,
            Event::VenueUpdated { id, .. }
            | Event::VenueDeleted { id } => *id,
            Event::BookingCreated { booking } => booking.venue_id,
            Event::BookingEdited { venue_id, .. }
            | Event::BookingStatusChanged { venue_id, .. }
            | Event::BookingDeleted { venue_id, .. } => *venue_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Aggregate committed demand against a capacity ceiling. `capacity` and
/// `remaining` are `None` for kinds without an aggregate ceiling
/// (restaurants, services).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub capacity: Option<u32>,
    pub committed: u32,
    pub remaining: Option<u32>,
    pub is_full: bool,
}

/// A booking as seen by the venue owner, with the venue summary attached.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerBooking {
    pub booking: Booking,
    pub venue_id: Ulid,
    pub venue_name: String,
    pub venue_kind: VenueKind,
}

/// Aggregate counters for the admin view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub venues: u64,
    pub bookings: u64,
    pub pending: u64,
    pub accepted: u64,
    pub declined: u64,
    pub withdrawn: u64,
}
