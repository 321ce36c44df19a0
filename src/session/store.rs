//! The session store contract shared by all backends.

use chrono::Duration;

use super::error::Result;
use super::types::Session;

/// Storage backend for session records.
///
/// Every method is atomic with respect to the others for a given identifier.
pub trait SessionStore: Send + Sync {
    /// Insert an empty record that expires `ttl` from now, replacing any
    /// record already stored under `id`.
    fn create(&self, id: &str, ttl: Duration) -> Result<()>;

    /// Return a copy of the record, or `NoRecord`.
    fn read(&self, id: &str) -> Result<Session>;

    /// Load, mutate and persist the record in one step.
    ///
    /// Returns `NoRecord` without calling `mutator` if the record is absent.
    fn update(&self, id: &str, mutator: &mut dyn FnMut(&mut Session)) -> Result<()>;

    /// Remove the record. Removing an unknown identifier is not an error.
    fn delete(&self, id: &str) -> Result<()>;

    /// Remove every record whose expiry has passed. Returns the number removed.
    fn evict_expired(&self) -> Result<usize>;

    /// Number of stored records, expired or not.
    fn session_count(&self) -> Result<usize>;

    /// Reclaim backend storage space. Returns whether anything was reclaimed.
    fn reclaim(&self) -> Result<bool> {
        Ok(false)
    }
}
