mod authz;
mod availability;
mod bookings;
mod error;
mod policy;
mod queries;
#[cfg(test)]
mod tests;
mod venues;

pub use availability::{availability_of, committed_demand, find_slot_conflict, Probe};
pub use error::EngineError;
pub use policy::{policy_for, BookingDraft, BookingPolicy, BookingRequest};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedVenueState = Arc<RwLock<VenueState>>;

/// The booking engine: all venue state in memory, durably backed by an
/// append-only WAL. Each venue's state sits behind its own `RwLock`, so a
/// venue's check-and-insert path is serialized while reads stay concurrent.
pub struct Engine {
    pub(super) state: DashMap<Ulid, SharedVenueState>,
    wal: Mutex<Wal>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: booking id → venue id.
    pub(super) booking_to_venue: DashMap<Ulid, Ulid>,
    /// Owner → venues index for owner-scoped listings.
    pub(super) owned_by: DashMap<Ulid, Vec<Ulid>>,
}

/// Apply a booking-level event to a VenueState (no locking — caller holds
/// the lock).
fn apply_to_state(vs: &mut VenueState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::VenueUpdated { name, rules, .. } => {
            vs.venue.name = name.clone();
            vs.venue.rules = rules.clone();
        }
        Event::BookingCreated { booking } => {
            index.insert(booking.id, booking.venue_id);
            vs.insert_booking(booking.clone());
        }
        Event::BookingEdited { id, slot, quantity, total_price, updated_at, .. } => {
            if let Some(b) = vs.booking_mut(*id) {
                b.slot = *slot;
                b.quantity = *quantity;
                b.total_price = *total_price;
                b.updated_at = *updated_at;
            }
        }
        Event::BookingStatusChanged { id, status, reason, updated_at, .. } => {
            if let Some(b) = vs.booking_mut(*id) {
                b.status = *status;
                if reason.is_some() {
                    b.status_reason = reason.clone();
                }
                b.updated_at = *updated_at;
            }
        }
        Event::BookingDeleted { id, .. } => {
            vs.remove_booking(*id);
            index.remove(id);
        }
        // Venue create/delete are handled at the DashMap level, not here
        Event::VenueCreated { .. } | Event::VenueDeleted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;

        let engine = Self {
            state: DashMap::new(),
            wal: Mutex::new(wal),
            notify,
            booking_to_venue: DashMap::new(),
            owned_by: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::VenueCreated { venue } => {
                    engine.owned_by.entry(venue.owner).or_default().push(venue.id);
                    engine
                        .state
                        .insert(venue.id, Arc::new(RwLock::new(VenueState::new(venue.clone()))));
                }
                Event::VenueDeleted { id } => {
                    if let Some((_, vs)) = engine.state.remove(id) {
                        let guard = vs.try_read().expect("replay: uncontended read");
                        if let Some(mut owned) = engine.owned_by.get_mut(&guard.venue.owner) {
                            owned.retain(|v| v != id);
                        }
                        for b in &guard.bookings {
                            engine.booking_to_venue.remove(&b.id);
                        }
                    }
                }
                other => {
                    if let Some(entry) = engine.state.get(&other.venue_id()) {
                        let vs = entry.value().clone();
                        let mut guard = vs.try_write().expect("replay: uncontended write");
                        apply_to_state(&mut guard, other, &engine.booking_to_venue);
                    }
                }
            }
        }
        metrics::gauge!(crate::observability::VENUES_ACTIVE).set(engine.state.len() as f64);

        Ok(engine)
    }

    /// Durably append an event to the WAL.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let start = std::time::Instant::now();
        let result = {
            let mut wal = self.wal.lock().await;
            wal.append(event)
        };
        metrics::histogram!(crate::observability::WAL_APPEND_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        result.map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn venue_state(&self, id: &Ulid) -> Option<SharedVenueState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn venue_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_venue.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply in one call.
    pub(super) async fn persist_and_apply(
        &self,
        vs: &mut VenueState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_state(vs, event, &self.booking_to_venue);
        Ok(())
    }

    /// Lookup booking → venue, get venue state, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<VenueState>, EngineError> {
        let venue_id = self
            .venue_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let vs = self
            .venue_state(&venue_id)
            .ok_or(EngineError::NotFound(venue_id))?;
        let guard = vs.write_owned().await;
        // The venue may have been deleted while we waited on the lock
        if !self.state.contains_key(&venue_id) {
            return Err(EngineError::NotFound(*booking_id));
        }
        Ok(guard)
    }
}
