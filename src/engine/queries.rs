use ulid::Ulid;

use crate::model::*;

use super::{authz, Engine, EngineError};

impl Engine {
    pub async fn get_venue(&self, id: Ulid) -> Result<Venue, EngineError> {
        let vs = self.venue_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = vs.read().await;
        Ok(guard.venue.clone())
    }

    /// Snapshot of the catalog. Waits out any in-flight mutation on a venue
    /// rather than failing — mutations hold the write lock across the WAL
    /// append, so contention here is ordinary.
    pub async fn list_venues(&self) -> Vec<Venue> {
        let venues: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(venues.len());
        for vs in venues {
            out.push(vs.read().await.venue.clone());
        }
        out
    }

    /// Venue ids owned by a principal, via the owner index (the membership
    /// flavor of the ownership check).
    pub fn venues_owned_by(&self, owner: &Ulid) -> Vec<Ulid> {
        self.owned_by
            .get(owner)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// Single booking, readable by its requester or the venue owner.
    pub async fn get_booking(
        &self,
        principal: &Principal,
        booking_id: Ulid,
    ) -> Result<Booking, EngineError> {
        let venue_id = self
            .venue_for_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let vs = self.venue_state(&venue_id).ok_or(EngineError::NotFound(venue_id))?;
        let guard = vs.read().await;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        authz::require_reader(principal, booking, &guard.venue)?;
        Ok(booking.clone())
    }

    /// Every booking across all of the caller's venues, newest first, with
    /// the venue summary attached.
    pub async fn owner_bookings(&self, principal: &Principal) -> Vec<OwnerBooking> {
        let mut out = Vec::new();
        for venue_id in self.venues_owned_by(&principal.id) {
            let Some(vs) = self.venue_state(&venue_id) else { continue };
            let guard = vs.read().await;
            for b in &guard.bookings {
                out.push(OwnerBooking {
                    booking: b.clone(),
                    venue_id: guard.venue.id,
                    venue_name: guard.venue.name.clone(),
                    venue_kind: guard.venue.kind(),
                });
            }
        }
        out.sort_by(|a, b| b.booking.created_at.cmp(&a.booking.created_at));
        out
    }

    /// Every booking the caller has requested, newest first.
    pub async fn requester_bookings(&self, principal: &Principal) -> Vec<Booking> {
        let mut out = Vec::new();
        let venues: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        for vs in venues {
            let guard = vs.read().await;
            out.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.requester == principal.id)
                    .cloned(),
            );
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Aggregate counters for the admin view.
    pub async fn stats(&self, principal: &Principal) -> Result<Stats, EngineError> {
        authz::require_admin(principal)?;
        let mut stats = Stats::default();
        let venues: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        stats.venues = venues.len() as u64;
        for vs in venues {
            let guard = vs.read().await;
            for b in &guard.bookings {
                stats.bookings += 1;
                match b.status {
                    BookingStatus::Pending => stats.pending += 1,
                    BookingStatus::Accepted => stats.accepted += 1,
                    BookingStatus::Declined => stats.declined += 1,
                    BookingStatus::Withdrawn => stats.withdrawn += 1,
                }
            }
        }
        Ok(stats)
    }
}
