use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::model::*;
use crate::notify::{NoticeKind, NotifyHub};

use super::*;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("reserva_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn new_engine(name: &str) -> Engine {
    Engine::new(test_wal_path(name), Arc::new(NotifyHub::new())).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn restaurant_rules(max_pax: u32) -> VenueRules {
    VenueRules::Restaurant {
        max_pax,
        opens_at: time(18, 0),
        closes_at: time(23, 0),
        closed_days: vec![Weekday::Mon],
    }
}

fn event_rules(max_capacity: u32, price: i64) -> VenueRules {
    VenueRules::Event { max_capacity, ticket_price: Decimal::from(price) }
}

fn activity_rules(capacity: u32, price: i64, dates: Vec<NaiveDate>) -> VenueRules {
    VenueRules::Activity { capacity, price_per_person: Decimal::from(price), dates }
}

fn service_rules(rate: i64) -> VenueRules {
    VenueRules::Service { hourly_rate: Decimal::from(rate) }
}

fn empty_request(venue_id: Ulid) -> BookingRequest {
    BookingRequest { venue_id, at: None, date: None, start: None, hours: None, quantity: None }
}

fn ticket_request(venue_id: Ulid, tickets: u32) -> BookingRequest {
    BookingRequest { quantity: Some(tickets), ..empty_request(venue_id) }
}

/// An open evening within the next week (skips the Monday closure).
fn next_valid_seating() -> chrono::DateTime<Utc> {
    for k in 1..=7 {
        let day = (Utc::now() + Duration::days(k)).date_naive();
        if day.weekday() != Weekday::Mon {
            return day.and_hms_opt(19, 0, 0).unwrap().and_utc();
        }
    }
    unreachable!("a non-Monday exists in any 7-day window");
}

fn future_date(days: i64) -> NaiveDate {
    (Utc::now() + Duration::days(days)).date_naive()
}

// ── Venue catalog ────────────────────────────────────────────────

#[tokio::test]
async fn venue_creation_requires_owner_role() {
    let engine = new_engine("venue_role.wal");
    let plain = Principal::user(Ulid::new());
    let err = engine
        .create_venue(&plain, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn venue_update_is_owner_only_and_kind_locked() {
    let engine = new_engine("venue_update.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();

    let stranger = Principal::owner(Ulid::new());
    let err = engine
        .update_venue(&stranger, venue.id, "Mine now".into(), event_rules(10, 25))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = engine
        .update_venue(&owner, venue.id, "Concert".into(), service_rules(40))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unsupported(_)));

    let updated = engine
        .update_venue(&owner, venue.id, "Bigger concert".into(), event_rules(20, 25))
        .await
        .unwrap();
    assert_eq!(updated.name, "Bigger concert");
    assert!(matches!(updated.rules, VenueRules::Event { max_capacity: 20, .. }));
}

#[tokio::test]
async fn venue_with_live_bookings_cannot_be_deleted() {
    let engine = new_engine("venue_delete_guard.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();
    let requester = Principal::user(Ulid::new());
    let booking = engine
        .create_booking(&requester, &ticket_request(venue.id, 2))
        .await
        .unwrap();

    let err = engine.delete_venue(&owner, venue.id).await.unwrap_err();
    assert_eq!(err, EngineError::HasActiveBookings(venue.id));

    // Declining frees the venue for deletion
    engine.decline_booking(&owner, booking.id, None).await.unwrap();
    engine.delete_venue(&owner, venue.id).await.unwrap();
    assert!(matches!(
        engine.get_venue(venue.id).await.unwrap_err(),
        EngineError::NotFound(_)
    ));
    // The booking index is cleaned up with the venue
    assert!(engine.venue_for_booking(&booking.id).is_none());
}

#[tokio::test]
async fn venue_sanity_checks() {
    let engine = new_engine("venue_sanity.wal");
    let owner = Principal::owner(Ulid::new());

    let err = engine
        .create_venue(&owner, "Zero".into(), event_rules(0, 25))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(_)));

    let err = engine
        .create_venue(&owner, "No dates".into(), activity_rules(5, 10, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(_)));

    let err = engine
        .create_venue(
            &owner,
            "Backwards".into(),
            VenueRules::Restaurant {
                max_pax: 4,
                opens_at: time(23, 0),
                closes_at: time(18, 0),
                closed_days: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(_)));
}

// ── Event tickets ────────────────────────────────────────────────

#[tokio::test]
async fn event_capacity_is_enforced_cumulatively() {
    let engine = new_engine("event_capacity.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();

    let first = Principal::user(Ulid::new());
    let b = engine
        .create_booking(&first, &ticket_request(venue.id, 8))
        .await
        .unwrap();
    engine.approve_booking(&owner, b.id).await.unwrap();

    // 3 more would oversell
    let second = Principal::user(Ulid::new());
    let err = engine
        .create_booking(&second, &ticket_request(venue.id, 3))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::rejected("Not enough tickets available"));

    // 2 fit exactly; price = 25 × 2
    let booking = engine
        .create_booking(&second, &ticket_request(venue.id, 2))
        .await
        .unwrap();
    assert_eq!(booking.total_price, Some(Decimal::from(50)));
    assert_eq!(booking.status, BookingStatus::Pending);

    let avail = engine.check_availability(venue.id, Probe::Lifetime).await.unwrap();
    assert_eq!(avail.committed, 10);
    assert_eq!(avail.remaining, Some(0));
    assert!(avail.is_full);
}

#[tokio::test]
async fn cancelled_tickets_free_capacity() {
    let engine = new_engine("event_cancel_frees.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();

    let requester = Principal::user(Ulid::new());
    let b = engine
        .create_booking(&requester, &ticket_request(venue.id, 10))
        .await
        .unwrap();
    engine
        .create_booking(&requester, &ticket_request(venue.id, 1))
        .await
        .unwrap_err();

    engine.cancel_booking(&requester, b.id, None).await.unwrap();
    engine
        .create_booking(&requester, &ticket_request(venue.id, 10))
        .await
        .unwrap();
}

// ── Service slots ────────────────────────────────────────────────

#[tokio::test]
async fn service_slots_must_not_overlap() {
    let engine = new_engine("service_overlap.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Studio".into(), service_rules(40))
        .await
        .unwrap();
    let d = future_date(3);

    let requester = Principal::user(Ulid::new());
    let mut req = empty_request(venue.id);
    req.date = Some(d);
    req.start = Some(time(10, 0));
    req.hours = Some(2); // 10:00–12:00
    engine.create_booking(&requester, &req).await.unwrap();

    req.start = Some(time(11, 0));
    req.hours = Some(1); // 11:00–12:00 overlaps
    let err = engine.create_booking(&requester, &req).await.unwrap_err();
    assert_eq!(err, EngineError::rejected("time slot already booked"));

    req.start = Some(time(12, 0)); // 12:00–13:00 touches only
    let booking = engine.create_booking(&requester, &req).await.unwrap();
    assert_eq!(booking.quantity, 1);
    assert_eq!(booking.total_price, Some(Decimal::from(40)));

    // Same slot on another date is free
    req.date = Some(future_date(4));
    req.start = Some(time(11, 0));
    engine.create_booking(&requester, &req).await.unwrap();
}

// ── Restaurant seatings ──────────────────────────────────────────

#[tokio::test]
async fn restaurant_collects_every_violation() {
    let engine = new_engine("restaurant_violations.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Trattoria".into(), restaurant_rules(6))
        .await
        .unwrap();

    let requester = Principal::user(Ulid::new());
    let mut req = empty_request(venue.id);
    req.at = Some(next_valid_seating());

    req.quantity = Some(7);
    match engine.create_booking(&requester, &req).await.unwrap_err() {
        EngineError::Rejected(v) => {
            assert_eq!(v.len(), 1);
            assert!(v[0].contains("table limit"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }

    req.quantity = Some(11);
    match engine.create_booking(&requester, &req).await.unwrap_err() {
        EngineError::Rejected(v) => {
            assert_eq!(v.len(), 2);
            assert!(v.iter().any(|m| m.contains("table limit")));
            assert!(v.iter().any(|m| m.contains("contact the venue directly")));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }

    req.quantity = Some(4);
    let booking = engine.create_booking(&requester, &req).await.unwrap();
    assert_eq!(booking.total_price, None);
}

#[tokio::test]
async fn restaurant_horizon_is_fourteen_days() {
    let engine = new_engine("restaurant_horizon.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Trattoria".into(), restaurant_rules(6))
        .await
        .unwrap();

    let requester = Principal::user(Ulid::new());
    let mut req = empty_request(venue.id);
    req.quantity = Some(2);
    // 20 days out on an open weekday evening
    let mut day = (Utc::now() + Duration::days(20)).date_naive();
    if day.weekday() == Weekday::Mon {
        day = day.succ_opt().unwrap();
    }
    req.at = Some(day.and_hms_opt(19, 0, 0).unwrap().and_utc());

    match engine.create_booking(&requester, &req).await.unwrap_err() {
        EngineError::Rejected(v) => assert!(v.iter().any(|m| m.contains("14 days"))),
        other => panic!("expected Rejected, got {other:?}"),
    }
}

// ── Activity dates ───────────────────────────────────────────────

#[tokio::test]
async fn activity_owner_cancel_defaults_reason_then_conflicts() {
    let engine = new_engine("activity_cancel.wal");
    let owner = Principal::owner(Ulid::new());
    let d = future_date(5);
    let venue = engine
        .create_venue(&owner, "Kayak tour".into(), activity_rules(6, 30, vec![d]))
        .await
        .unwrap();

    let requester = Principal::user(Ulid::new());
    let mut req = empty_request(venue.id);
    req.date = Some(d);
    req.quantity = Some(2);
    let booking = engine.create_booking(&requester, &req).await.unwrap();
    engine.approve_booking(&owner, booking.id).await.unwrap();

    // Owner cancels the confirmed booking with no reason supplied
    let cancelled = engine.cancel_booking(&owner, booking.id, None).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Withdrawn);
    assert_eq!(cancelled.status_reason.as_deref(), Some(crate::limits::DEFAULT_REASON));

    // Second cancel hits the terminal state
    let err = engine.cancel_booking(&owner, booking.id, None).await.unwrap_err();
    assert_eq!(err, EngineError::InvalidTransition { from: BookingStatus::Withdrawn });
}

#[tokio::test]
async fn activity_capacity_is_per_date() {
    let engine = new_engine("activity_per_date.wal");
    let owner = Principal::owner(Ulid::new());
    let d1 = future_date(5);
    let d2 = future_date(6);
    let venue = engine
        .create_venue(&owner, "Kayak tour".into(), activity_rules(6, 30, vec![d1, d2]))
        .await
        .unwrap();

    let requester = Principal::user(Ulid::new());
    let mut req = empty_request(venue.id);
    req.date = Some(d1);
    req.quantity = Some(6);
    engine.create_booking(&requester, &req).await.unwrap();

    // d1 is saturated
    req.quantity = Some(1);
    let err = engine.create_booking(&requester, &req).await.unwrap_err();
    assert_eq!(err, EngineError::rejected("Not enough capacity"));
    let avail = engine.check_availability(venue.id, Probe::Day(d1)).await.unwrap();
    assert!(avail.is_full);

    // d2 is untouched
    req.date = Some(d2);
    req.quantity = Some(6);
    engine.create_booking(&requester, &req).await.unwrap();
}

// ── State machine & authorization ────────────────────────────────

#[tokio::test]
async fn non_owner_cannot_approve_and_status_is_unchanged() {
    let engine = new_engine("approve_forbidden.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Trattoria".into(), restaurant_rules(6))
        .await
        .unwrap();

    let requester = Principal::user(Ulid::new());
    let mut req = empty_request(venue.id);
    req.at = Some(next_valid_seating());
    req.quantity = Some(2);
    let booking = engine.create_booking(&requester, &req).await.unwrap();

    // Neither the requester nor a stranger may approve
    for caller in [requester, Principal::user(Ulid::new())] {
        let err = engine.approve_booking(&caller, booking.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }
    let fetched = engine.get_booking(&requester, booking.id).await.unwrap();
    assert_eq!(fetched.status, BookingStatus::Pending);
}

#[tokio::test]
async fn terminal_states_are_not_reenterable() {
    let engine = new_engine("terminal.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();
    let requester = Principal::user(Ulid::new());
    let booking = engine
        .create_booking(&requester, &ticket_request(venue.id, 2))
        .await
        .unwrap();

    engine
        .decline_booking(&owner, booking.id, Some("overbooked".into()))
        .await
        .unwrap();

    let err = engine.approve_booking(&owner, booking.id).await.unwrap_err();
    assert_eq!(err, EngineError::InvalidTransition { from: BookingStatus::Declined });
    let err = engine.decline_booking(&owner, booking.id, None).await.unwrap_err();
    assert_eq!(err, EngineError::InvalidTransition { from: BookingStatus::Declined });

    let fetched = engine.get_booking(&owner, booking.id).await.unwrap();
    assert_eq!(fetched.status, BookingStatus::Declined);
    assert_eq!(fetched.status_reason.as_deref(), Some("overbooked"));
}

#[tokio::test]
async fn restaurant_has_no_cancel_transition() {
    let engine = new_engine("restaurant_no_cancel.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Trattoria".into(), restaurant_rules(6))
        .await
        .unwrap();
    let requester = Principal::user(Ulid::new());
    let mut req = empty_request(venue.id);
    req.at = Some(next_valid_seating());
    req.quantity = Some(2);
    let booking = engine.create_booking(&requester, &req).await.unwrap();
    engine.approve_booking(&owner, booking.id).await.unwrap();

    let err = engine.cancel_booking(&owner, booking.id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Unsupported(_)));
}

#[tokio::test]
async fn requester_may_withdraw_a_confirmed_event_booking() {
    let engine = new_engine("requester_withdraw.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();
    let requester = Principal::user(Ulid::new());
    let booking = engine
        .create_booking(&requester, &ticket_request(venue.id, 2))
        .await
        .unwrap();
    engine.approve_booking(&owner, booking.id).await.unwrap();

    // A stranger cannot cancel
    let err = engine
        .cancel_booking(&Principal::user(Ulid::new()), booking.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let cancelled = engine
        .cancel_booking(&requester, booking.id, Some("plans changed".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Withdrawn);
    assert_eq!(cancelled.status_reason.as_deref(), Some("plans changed"));
}

#[tokio::test]
async fn decline_reason_is_bounded() {
    let engine = new_engine("reason_bound.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();
    let requester = Principal::user(Ulid::new());
    let booking = engine
        .create_booking(&requester, &ticket_request(venue.id, 2))
        .await
        .unwrap();

    let long = "x".repeat(crate::limits::MAX_REASON_LEN + 1);
    let err = engine
        .decline_booking(&owner, booking.id, Some(long))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(_)));

    // Still pending — the oversized reason never reached the state machine
    let fetched = engine.get_booking(&owner, booking.id).await.unwrap();
    assert_eq!(fetched.status, BookingStatus::Pending);

    // The bound counts characters, not bytes: 200 two-byte characters pass
    let multibyte = "é".repeat(crate::limits::MAX_REASON_LEN);
    let declined = engine
        .decline_booking(&owner, booking.id, Some(multibyte.clone()))
        .await
        .unwrap();
    assert_eq!(declined.status_reason.as_deref(), Some(multibyte.as_str()));
}

// ── Requester edit / delete ──────────────────────────────────────

#[tokio::test]
async fn edit_revalidates_excluding_itself() {
    let engine = new_engine("edit_exclude.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();
    let requester = Principal::user(Ulid::new());
    let booking = engine
        .create_booking(&requester, &ticket_request(venue.id, 8))
        .await
        .unwrap();

    // Growing 8 → 10 is fine because the edit excludes its own 8
    let edited = engine
        .edit_booking(&requester, booking.id, &ticket_request(venue.id, 10))
        .await
        .unwrap();
    assert_eq!(edited.quantity, 10);
    assert_eq!(edited.total_price, Some(Decimal::from(250)));

    // 11 oversells
    let err = engine
        .edit_booking(&requester, booking.id, &ticket_request(venue.id, 11))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::rejected("Not enough tickets available"));
}

#[tokio::test]
async fn edit_is_requester_only_and_pending_only() {
    let engine = new_engine("edit_guards.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();
    let requester = Principal::user(Ulid::new());
    let booking = engine
        .create_booking(&requester, &ticket_request(venue.id, 2))
        .await
        .unwrap();

    // The venue owner may not edit the requester's booking
    let err = engine
        .edit_booking(&owner, booking.id, &ticket_request(venue.id, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    // A booking cannot move to another venue
    let other = engine
        .create_venue(&owner, "Other".into(), event_rules(10, 25))
        .await
        .unwrap();
    let err = engine
        .edit_booking(&requester, booking.id, &ticket_request(other.id, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(_)));

    engine.approve_booking(&owner, booking.id).await.unwrap();
    let err = engine
        .edit_booking(&requester, booking.id, &ticket_request(venue.id, 3))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidTransition { from: BookingStatus::Accepted });
}

#[tokio::test]
async fn delete_is_requester_only_while_pending() {
    let engine = new_engine("delete_guards.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();
    let requester = Principal::user(Ulid::new());
    let booking = engine
        .create_booking(&requester, &ticket_request(venue.id, 2))
        .await
        .unwrap();

    // The owner never deletes — they decline instead
    let err = engine.delete_booking(&owner, booking.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    engine.delete_booking(&requester, booking.id).await.unwrap();
    assert!(matches!(
        engine.get_booking(&requester, booking.id).await.unwrap_err(),
        EngineError::NotFound(_)
    ));

    // Deleted bookings no longer hold capacity
    let avail = engine.check_availability(venue.id, Probe::Lifetime).await.unwrap();
    assert_eq!(avail.committed, 0);
}

// ── Round trips, listings, notifications, persistence ────────────

#[tokio::test]
async fn create_then_fetch_returns_same_fields() {
    let engine = new_engine("round_trip.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();
    let requester = Principal::user(Ulid::new());
    let created = engine
        .create_booking(&requester, &ticket_request(venue.id, 3))
        .await
        .unwrap();

    let fetched = engine.get_booking(&requester, created.id).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.status, BookingStatus::Pending);
    assert_eq!(fetched.quantity, 3);
    assert_eq!(fetched.total_price, Some(Decimal::from(75)));

    // A third party gets Forbidden, not NotFound
    let err = engine
        .get_booking(&Principal::user(Ulid::new()), created.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn owner_bookings_span_all_owned_venues() {
    let engine = new_engine("owner_listing.wal");
    let owner = Principal::owner(Ulid::new());
    let concert = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();
    let studio = engine
        .create_venue(&owner, "Studio".into(), service_rules(40))
        .await
        .unwrap();
    let other_owner = Principal::owner(Ulid::new());
    let other = engine
        .create_venue(&other_owner, "Elsewhere".into(), event_rules(10, 25))
        .await
        .unwrap();

    let requester = Principal::user(Ulid::new());
    engine
        .create_booking(&requester, &ticket_request(concert.id, 2))
        .await
        .unwrap();
    let mut req = empty_request(studio.id);
    req.date = Some(future_date(3));
    req.start = Some(time(10, 0));
    req.hours = Some(1);
    engine.create_booking(&requester, &req).await.unwrap();
    engine
        .create_booking(&requester, &ticket_request(other.id, 1))
        .await
        .unwrap();

    let listed = engine.owner_bookings(&owner).await;
    assert_eq!(listed.len(), 2);
    // Newest first, venue summaries attached
    assert!(listed[0].booking.created_at >= listed[1].booking.created_at);
    let names: Vec<_> = listed.iter().map(|o| o.venue_name.as_str()).collect();
    assert!(names.contains(&"Concert"));
    assert!(names.contains(&"Studio"));

    let mine = engine.requester_bookings(&requester).await;
    assert_eq!(mine.len(), 3);
}

#[tokio::test]
async fn notices_flow_to_the_right_party() {
    let notify = Arc::new(NotifyHub::new());
    let engine = Engine::new(test_wal_path("notices.wal"), notify.clone()).unwrap();

    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();
    let requester = Principal::user(Ulid::new());
    let mut rx_requester = notify.subscribe(requester.id);
    let mut rx_owner = notify.subscribe(owner.id);

    let booking = engine
        .create_booking(&requester, &ticket_request(venue.id, 2))
        .await
        .unwrap();
    let n = rx_requester.recv().await.unwrap();
    assert_eq!(n.kind, NoticeKind::BookingReceived);
    assert_eq!(n.booking_id, booking.id);

    engine.approve_booking(&owner, booking.id).await.unwrap();
    let n = rx_requester.recv().await.unwrap();
    assert_eq!(n.kind, NoticeKind::BookingAccepted);

    // Requester cancels → the owner hears about it, reason included
    engine
        .cancel_booking(&requester, booking.id, Some("plans changed".into()))
        .await
        .unwrap();
    let n = rx_owner.recv().await.unwrap();
    assert_eq!(n.kind, NoticeKind::BookingWithdrawn);
    assert_eq!(n.reason.as_deref(), Some("plans changed"));
}

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");
    let owner = Principal::owner(Ulid::new());
    let requester = Principal::user(Ulid::new());
    let (venue_id, accepted_id, declined_id);

    {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        let venue = engine
            .create_venue(&owner, "Concert".into(), event_rules(10, 25))
            .await
            .unwrap();
        venue_id = venue.id;
        let a = engine
            .create_booking(&requester, &ticket_request(venue_id, 4))
            .await
            .unwrap();
        engine.approve_booking(&owner, a.id).await.unwrap();
        accepted_id = a.id;
        let d = engine
            .create_booking(&requester, &ticket_request(venue_id, 3))
            .await
            .unwrap();
        engine
            .decline_booking(&owner, d.id, Some("sold elsewhere".into()))
            .await
            .unwrap();
        declined_id = d.id;
    }

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    let venue = engine.get_venue(venue_id).await.unwrap();
    assert_eq!(venue.name, "Concert");

    let accepted = engine.get_booking(&requester, accepted_id).await.unwrap();
    assert_eq!(accepted.status, BookingStatus::Accepted);
    let declined = engine.get_booking(&requester, declined_id).await.unwrap();
    assert_eq!(declined.status, BookingStatus::Declined);
    assert_eq!(declined.status_reason.as_deref(), Some("sold elsewhere"));

    // Only the accepted booking still commits capacity
    let avail = engine.check_availability(venue_id, Probe::Lifetime).await.unwrap();
    assert_eq!(avail.committed, 4);
}

#[tokio::test]
async fn concurrent_requests_cannot_oversell() {
    let engine = Arc::new(new_engine("race.wal"));
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();

    // Ten tasks race for 6 tickets each; at most one can win
    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        let req = ticket_request(venue.id, 6);
        handles.push(tokio::spawn(async move {
            let requester = Principal::user(Ulid::new());
            engine.create_booking(&requester, &req).await.is_ok()
        }));
    }
    let mut wins = 0;
    for h in handles {
        if h.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);

    let avail = engine.check_availability(venue.id, Probe::Lifetime).await.unwrap();
    assert_eq!(avail.committed, 6);
}

#[tokio::test]
async fn listing_waits_out_an_in_flight_write() {
    let engine = Arc::new(new_engine("list_contended.wal"));
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();

    // Hold the venue's write lock, as a mutation does across the WAL append
    let vs = engine.venue_state(&venue.id).unwrap();
    let guard = vs.write_owned().await;

    let e = engine.clone();
    let listing = tokio::spawn(async move { e.list_venues().await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!listing.is_finished());

    drop(guard);
    let listed = listing.await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Concert");
}

#[tokio::test]
async fn booking_cannot_land_on_a_deleting_venue() {
    let path = test_wal_path("delete_race.wal");
    let engine = Arc::new(Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap());
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();

    // Stall the venue so a delete and a create both queue on its lock,
    // delete first — the lock hands off in FIFO order
    let vs = engine.venue_state(&venue.id).unwrap();
    let guard = vs.write_owned().await;

    let e = engine.clone();
    let venue_id = venue.id;
    let delete = tokio::spawn(async move { e.delete_venue(&owner, venue_id).await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let e = engine.clone();
    let create = tokio::spawn(async move {
        e.create_booking(&Principal::user(Ulid::new()), &ticket_request(venue_id, 2))
            .await
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    drop(guard);
    delete.await.unwrap().unwrap();

    // The create acquired the lock of an already-deleted venue and must
    // refuse instead of journaling a booking against it
    let err = create.await.unwrap().unwrap_err();
    assert_eq!(err, EngineError::NotFound(venue_id));

    // No booking event made it into the journal after the deletion
    let restarted = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    assert!(restarted.venue_state(&venue_id).is_none());
    assert!(restarted.booking_to_venue.is_empty());
}

#[tokio::test]
async fn stats_are_admin_only() {
    let engine = new_engine("stats.wal");
    let owner = Principal::owner(Ulid::new());
    let venue = engine
        .create_venue(&owner, "Concert".into(), event_rules(10, 25))
        .await
        .unwrap();
    let requester = Principal::user(Ulid::new());
    let a = engine
        .create_booking(&requester, &ticket_request(venue.id, 2))
        .await
        .unwrap();
    engine.approve_booking(&owner, a.id).await.unwrap();
    engine
        .create_booking(&requester, &ticket_request(venue.id, 1))
        .await
        .unwrap();

    let err = engine.stats(&owner).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let stats = engine.stats(&Principal::admin(Ulid::new())).await.unwrap();
    assert_eq!(stats.venues, 1);
    assert_eq!(stats.bookings, 2);
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.pending, 1);
}
