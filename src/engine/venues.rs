use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{authz, Engine, EngineError};

fn validate_rules(rules: &VenueRules) -> Result<(), EngineError> {
    match rules {
        VenueRules::Restaurant { max_pax, opens_at, closes_at, .. } => {
            if *max_pax == 0 {
                return Err(EngineError::rejected("maxPax must be at least 1"));
            }
            if opens_at >= closes_at {
                return Err(EngineError::rejected("opening hours must start before they end"));
            }
        }
        VenueRules::Event { max_capacity, ticket_price } => {
            if *max_capacity == 0 {
                return Err(EngineError::rejected("maxCapacity must be at least 1"));
            }
            if ticket_price.is_sign_negative() {
                return Err(EngineError::rejected("ticket price cannot be negative"));
            }
        }
        VenueRules::Activity { capacity, price_per_person, dates } => {
            if *capacity == 0 {
                return Err(EngineError::rejected("capacity must be at least 1"));
            }
            if price_per_person.is_sign_negative() {
                return Err(EngineError::rejected("price cannot be negative"));
            }
            if dates.is_empty() {
                return Err(EngineError::rejected("an activity needs at least one date"));
            }
            if dates.len() > MAX_ACTIVITY_DATES {
                return Err(EngineError::LimitExceeded("too many activity dates"));
            }
        }
        VenueRules::Service { hourly_rate } => {
            if hourly_rate.is_sign_negative() {
                return Err(EngineError::rejected("hourly rate cannot be negative"));
            }
        }
    }
    Ok(())
}

impl Engine {
    pub async fn create_venue(
        &self,
        principal: &Principal,
        name: String,
        rules: VenueRules,
    ) -> Result<Venue, EngineError> {
        authz::require_owner_role(principal)?;
        if self.state.len() >= MAX_VENUES {
            return Err(EngineError::LimitExceeded("too many venues"));
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::rejected("venue name length out of range"));
        }
        validate_rules(&rules)?;

        let venue = Venue { id: Ulid::new(), owner: principal.id, name, rules };
        let event = Event::VenueCreated { venue: venue.clone() };
        self.wal_append(&event).await?;

        self.owned_by.entry(venue.owner).or_default().push(venue.id);
        self.state
            .insert(venue.id, Arc::new(RwLock::new(VenueState::new(venue.clone()))));
        metrics::gauge!(crate::observability::VENUES_ACTIVE).set(self.state.len() as f64);
        Ok(venue)
    }

    pub async fn update_venue(
        &self,
        principal: &Principal,
        id: Ulid,
        name: String,
        rules: VenueRules,
    ) -> Result<Venue, EngineError> {
        let vs = self.venue_state(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = vs.write().await;
        // The venue may have been deleted while we waited on the lock
        if !self.state.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        authz::require_owner(principal, &guard.venue)?;
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::rejected("venue name length out of range"));
        }
        // Bookings were normalized under this kind's policy; they cannot be
        // reinterpreted under another.
        if rules.kind() != guard.venue.kind() {
            return Err(EngineError::Unsupported("venue kind cannot change"));
        }
        validate_rules(&rules)?;

        let event = Event::VenueUpdated { id, name, rules };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.venue.clone())
    }

    pub async fn delete_venue(&self, principal: &Principal, id: Ulid) -> Result<(), EngineError> {
        let vs = self.venue_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = vs.write().await;
        if !self.state.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        authz::require_owner(principal, &guard.venue)?;
        if guard.committed().next().is_some() {
            return Err(EngineError::HasActiveBookings(id));
        }

        let event = Event::VenueDeleted { id };
        self.wal_append(&event).await?;

        for b in &guard.bookings {
            self.booking_to_venue.remove(&b.id);
        }
        if let Some(mut owned) = self.owned_by.get_mut(&guard.venue.owner) {
            owned.retain(|v| v != &id);
        }
        // Unmap before releasing the lock: a writer already queued on this
        // venue re-checks the map once it acquires and must see the removal
        self.state.remove(&id);
        drop(guard);
        metrics::gauge!(crate::observability::VENUES_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }
}
