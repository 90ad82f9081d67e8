use chrono::Utc;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::{Notice, NoticeKind};
use crate::observability;

use super::availability::{availability_of, Probe};
use super::policy::{policy_for, BookingRequest};
use super::{authz, Engine, EngineError};

/// Default + bound a decline/cancel reason.
fn normalize_reason(reason: Option<String>) -> Result<String, EngineError> {
    let reason = reason.filter(|r| !r.trim().is_empty());
    match reason {
        None => Ok(DEFAULT_REASON.to_string()),
        Some(r) if r.chars().count() > MAX_REASON_LEN => {
            Err(EngineError::rejected("reason must be at most 200 characters"))
        }
        Some(r) => Ok(r),
    }
}

impl Engine {
    /// Pure read: committed demand and remaining capacity for a venue under
    /// a temporal probe. No side effects, idempotent.
    pub async fn check_availability(
        &self,
        venue_id: Ulid,
        probe: Probe,
    ) -> Result<Availability, EngineError> {
        let vs = self.venue_state(&venue_id).ok_or(EngineError::NotFound(venue_id))?;
        let guard = vs.read().await;
        Ok(availability_of(&guard.venue, &guard.bookings, &probe))
    }

    /// Validate and persist a booking in one step. Validation runs under the
    /// venue's write lock, so two requests racing for the last unit of
    /// capacity cannot both pass.
    pub async fn create_booking(
        &self,
        principal: &Principal,
        req: &BookingRequest,
    ) -> Result<Booking, EngineError> {
        let vs = self
            .venue_state(&req.venue_id)
            .ok_or(EngineError::NotFound(req.venue_id))?;
        let mut guard = vs.write().await;
        // The venue may have been deleted while we waited on the lock
        if !self.state.contains_key(&req.venue_id) {
            return Err(EngineError::NotFound(req.venue_id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_VENUE {
            return Err(EngineError::LimitExceeded("too many bookings on venue"));
        }

        let kind = guard.venue.kind();
        let policy = policy_for(kind);
        let now = Utc::now();
        let draft = policy
            .validate(&guard.venue, &guard.bookings, req, None, now)
            .inspect_err(|_| {
                metrics::counter!(observability::BOOKINGS_REJECTED_TOTAL, "kind" => kind.to_string())
                    .increment(1);
            })?;

        let booking = Booking {
            id: Ulid::new(),
            venue_id: req.venue_id,
            requester: principal.id,
            slot: draft.slot,
            quantity: draft.quantity,
            total_price: draft.total_price,
            status: BookingStatus::Pending,
            status_reason: None,
            created_at: now,
            updated_at: now,
        };
        let event = Event::BookingCreated { booking: booking.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL, "kind" => kind.to_string())
            .increment(1);

        self.notify.send(Notice {
            recipient: booking.requester,
            kind: NoticeKind::BookingReceived,
            booking_id: booking.id,
            venue_id: booking.venue_id,
            reason: None,
        });
        Ok(booking)
    }

    /// Owner accepts a pending booking (approve/confirm, per kind).
    pub async fn approve_booking(
        &self,
        principal: &Principal,
        booking_id: Ulid,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        authz::require_owner(principal, &guard.venue)?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::InvalidTransition { from: booking.status });
        }

        let event = Event::BookingStatusChanged {
            id: booking_id,
            venue_id: guard.venue.id,
            status: BookingStatus::Accepted,
            reason: None,
            updated_at: Utc::now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::TRANSITIONS_TOTAL, "to" => "accepted").increment(1);

        let booking = guard.booking(booking_id).ok_or(EngineError::NotFound(booking_id))?;
        self.notify.send(Notice {
            recipient: booking.requester,
            kind: NoticeKind::BookingAccepted,
            booking_id,
            venue_id: booking.venue_id,
            reason: None,
        });
        Ok(booking.clone())
    }

    /// Owner declines a pending booking (reject/cancel-with-reason, per kind).
    pub async fn decline_booking(
        &self,
        principal: &Principal,
        booking_id: Ulid,
        reason: Option<String>,
    ) -> Result<Booking, EngineError> {
        let reason = normalize_reason(reason)?;
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        authz::require_owner(principal, &guard.venue)?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::InvalidTransition { from: booking.status });
        }

        let event = Event::BookingStatusChanged {
            id: booking_id,
            venue_id: guard.venue.id,
            status: BookingStatus::Declined,
            reason: Some(reason.clone()),
            updated_at: Utc::now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::TRANSITIONS_TOTAL, "to" => "declined").increment(1);

        let booking = guard.booking(booking_id).ok_or(EngineError::NotFound(booking_id))?;
        self.notify.send(Notice {
            recipient: booking.requester,
            kind: NoticeKind::BookingDeclined,
            booking_id,
            venue_id: booking.venue_id,
            reason: Some(reason),
        });
        Ok(booking.clone())
    }

    /// Withdraw a pending or accepted booking. Either party may cancel;
    /// the counterparty is notified. Restaurants have no cancel transition.
    pub async fn cancel_booking(
        &self,
        principal: &Principal,
        booking_id: Ulid,
        reason: Option<String>,
    ) -> Result<Booking, EngineError> {
        let reason = normalize_reason(reason)?;
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let policy = policy_for(guard.venue.kind());
        if !policy.supports_withdrawal() {
            return Err(EngineError::Unsupported(
                "restaurant bookings are approved or rejected by the venue",
            ));
        }
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let is_owner = principal.id == guard.venue.owner;
        let is_requester = principal.id == booking.requester;
        if !is_owner && !is_requester {
            return Err(EngineError::Forbidden("caller may not cancel this booking"));
        }
        if booking.status.is_terminal() {
            return Err(EngineError::InvalidTransition { from: booking.status });
        }
        let counterparty = if is_owner { booking.requester } else { guard.venue.owner };

        let event = Event::BookingStatusChanged {
            id: booking_id,
            venue_id: guard.venue.id,
            status: BookingStatus::Withdrawn,
            reason: Some(reason.clone()),
            updated_at: Utc::now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::TRANSITIONS_TOTAL, "to" => "withdrawn").increment(1);

        let booking = guard.booking(booking_id).ok_or(EngineError::NotFound(booking_id))?;
        self.notify.send(Notice {
            recipient: counterparty,
            kind: NoticeKind::BookingWithdrawn,
            booking_id,
            venue_id: booking.venue_id,
            reason: Some(reason),
        });
        Ok(booking.clone())
    }

    /// Requester reshapes a pending booking. Runs the full validation again
    /// with the booking itself excluded from committed demand. The venue and
    /// requester references are immutable.
    pub async fn edit_booking(
        &self,
        principal: &Principal,
        booking_id: Ulid,
        req: &BookingRequest,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        authz::require_requester(principal, booking)?;
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::InvalidTransition { from: booking.status });
        }
        if req.venue_id != booking.venue_id {
            return Err(EngineError::rejected("a booking cannot move to another venue"));
        }

        let policy = policy_for(guard.venue.kind());
        let draft =
            policy.validate(&guard.venue, &guard.bookings, req, Some(booking_id), Utc::now())?;

        let event = Event::BookingEdited {
            id: booking_id,
            venue_id: guard.venue.id,
            slot: draft.slot,
            quantity: draft.quantity,
            total_price: draft.total_price,
            updated_at: Utc::now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let booking = guard.booking(booking_id).ok_or(EngineError::NotFound(booking_id))?;
        Ok(booking.clone())
    }

    /// Requester removes a pending booking entirely. Owners never delete —
    /// they decline or cancel instead.
    pub async fn delete_booking(
        &self,
        principal: &Principal,
        booking_id: Ulid,
    ) -> Result<(), EngineError> {
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        authz::require_requester(principal, booking)?;
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::InvalidTransition { from: booking.status });
        }

        let event = Event::BookingDeleted { id: booking_id, venue_id: guard.venue.id };
        self.persist_and_apply(&mut guard, &event).await
    }
}
