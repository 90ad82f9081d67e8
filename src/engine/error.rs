use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug, PartialEq, Eq)]
pub enum EngineError {
    NotFound(Ulid),
    /// Validation failures. Restaurant validation collects every violation;
    /// the other kinds stop at the first, so the vec holds one entry.
    Rejected(Vec<String>),
    /// No credential resolved to a principal.
    AuthRequired,
    /// Authenticated but not entitled.
    Forbidden(&'static str),
    /// Transition attempted from a state that does not permit it.
    InvalidTransition { from: BookingStatus },
    /// Operation not defined for this venue kind.
    Unsupported(&'static str),
    /// Venue still has capacity-committing bookings.
    HasActiveBookings(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        EngineError::Rejected(vec![msg.into()])
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Rejected(violations) => {
                write!(f, "rejected: {}", violations.join("; "))
            }
            EngineError::AuthRequired => write!(f, "authentication required"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::InvalidTransition { from } => {
                write!(f, "no transition permitted from status {from:?}")
            }
            EngineError::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            EngineError::HasActiveBookings(id) => {
                write!(f, "cannot delete venue {id}: it has active bookings")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
