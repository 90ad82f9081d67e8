use std::io;
use std::str::FromStr;

use dashmap::DashMap;
use ulid::Ulid;

use crate::limits::MAX_TOKEN_LEN;
use crate::model::Principal;

/// Resolves bearer tokens to principals. This is the stand-in for the
/// external identity provider: the engine never sees tokens, only the
/// `Principal` this registry hands back.
pub struct AuthRegistry {
    tokens: DashMap<String, Principal>,
}

impl Default for AuthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthRegistry {
    pub fn new() -> Self {
        Self { tokens: DashMap::new() }
    }

    /// Build a registry from a `token:ulid:role` spec string, comma-separated.
    /// Role is one of `user`, `owner`, `admin`.
    pub fn from_spec(spec: &str) -> io::Result<Self> {
        let registry = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let mut parts = entry.splitn(3, ':');
            let (Some(token), Some(id), Some(role)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("malformed token entry: {entry:?}"),
                ));
            };
            if token.is_empty() || token.len() > MAX_TOKEN_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "token length out of range",
                ));
            }
            let id = Ulid::from_str(id).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("bad principal id: {e}"))
            })?;
            let principal = match role {
                "user" => Principal::user(id),
                "owner" => Principal::owner(id),
                "admin" => Principal::admin(id),
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("unknown role: {other:?}"),
                    ));
                }
            };
            registry.register(token, principal);
        }
        Ok(registry)
    }

    pub fn register(&self, token: impl Into<String>, principal: Principal) {
        self.tokens.insert(token.into(), principal);
    }

    /// Resolve a bearer credential. Failures are counted, not logged with the
    /// token itself.
    pub fn resolve(&self, token: &str) -> Option<Principal> {
        match self.tokens.get(token) {
            Some(entry) => Some(*entry.value()),
            None => {
                metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
                None
            }
        }
    }
}
