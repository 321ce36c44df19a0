//! Session record types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique session identifier (16-byte random value, hex-encoded on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; 16]);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(rand::random())
    }

    /// Convert to hex string for storage/cookies.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A stored session record.
///
/// The identifier is the store key and is not part of the record. Field order
/// is the on-disk order used by the persistent codec; do not reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Absolute deadline; the record is unusable once it has passed.
    pub expires_at: DateTime<Utc>,

    /// Last successful validated access, used for idle detection.
    pub last_active: DateTime<Utc>,

    /// Short-lived caller state, cleared on idle renewal.
    pub token: String,

    /// Caller-visible payload.
    pub data: HashMap<String, serde_json::Value>,
}

impl Session {
    /// Create an empty record that expires `ttl` from now.
    ///
    /// A zero or negative `ttl` yields a record that is already expired.
    pub fn new(ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            expires_at: deadline(now, ttl),
            last_active: now,
            token: String::new(),
            data: HashMap::new(),
        }
    }

    /// Check if the session is expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Check if the session has been inactive for longer than `idle_timeout`.
    pub fn is_idle_at(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        now > deadline(self.last_active, idle_timeout)
    }

    /// Update last active time. Never moves backwards.
    pub fn touch(&mut self) {
        self.last_active = self.last_active.max(Utc::now());
    }

    /// Push the expiry deadline to `ttl` from now.
    pub fn extend(&mut self, ttl: Duration) {
        self.expires_at = deadline(Utc::now(), ttl);
    }
}

/// `start + ttl`, saturating instead of overflowing.
pub(crate) fn deadline(start: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    start.checked_add_signed(ttl).unwrap_or(if ttl < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Outcome of classifying an incoming identifier against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// No record for the identifier.
    Invalid,
    /// Record found but past its expiry deadline.
    Expired,
    /// Record found and live, but inactive beyond the idle timeout.
    Idle,
    /// Record found, live and active.
    Valid,
}

impl std::fmt::Display for Validation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Validation::Invalid => write!(f, "invalid"),
            Validation::Expired => write!(f, "expired"),
            Validation::Idle => write!(f, "idle"),
            Validation::Valid => write!(f, "valid"),
        }
    }
}
