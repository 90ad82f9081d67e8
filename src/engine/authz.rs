//! Authorization gate. A venue's `owner` field is the sole source of truth
//! for ownership; every check is a direct equality against the acting
//! principal's id. The owned-set-membership pattern lives in
//! `Engine::owner_bookings`, which walks the owner index instead.

use crate::model::{Booking, Principal, Venue};

use super::EngineError;

/// Caller must be the venue's owner.
pub fn require_owner(principal: &Principal, venue: &Venue) -> Result<(), EngineError> {
    if principal.id == venue.owner {
        Ok(())
    } else {
        Err(EngineError::Forbidden("caller does not own this venue"))
    }
}

/// Caller must be the booking's requester.
pub fn require_requester(principal: &Principal, booking: &Booking) -> Result<(), EngineError> {
    if principal.id == booking.requester {
        Ok(())
    } else {
        Err(EngineError::Forbidden("caller did not request this booking"))
    }
}

/// Read access: the requester or the venue owner may see a booking.
pub fn require_reader(
    principal: &Principal,
    booking: &Booking,
    venue: &Venue,
) -> Result<(), EngineError> {
    if principal.id == booking.requester || principal.id == venue.owner {
        Ok(())
    } else {
        Err(EngineError::Forbidden("caller may not read this booking"))
    }
}

/// Caller must carry the owner role (venue creation).
pub fn require_owner_role(principal: &Principal) -> Result<(), EngineError> {
    if principal.is_owner {
        Ok(())
    } else {
        Err(EngineError::Forbidden("an owner account is required"))
    }
}

pub fn require_admin(principal: &Principal) -> Result<(), EngineError> {
    if principal.is_admin {
        Ok(())
    } else {
        Err(EngineError::Forbidden("an admin account is required"))
    }
}
