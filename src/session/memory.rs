//! In-memory session store.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::error::{Result, SessionError};
use super::store::SessionStore;
use super::types::Session;

/// Session store holding every record in a lock-guarded map.
///
/// Reads share the lock; creates, updates, deletes and the expiry sweep hold
/// it exclusively. A sweep therefore pauses all other traffic for its whole
/// pass, which is acceptable for a memory-resident map swept infrequently.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Writers never leave the map half-updated, so a poisoned lock still
    // guards consistent data.
    fn read_lock(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemoryStore {
    fn create(&self, id: &str, ttl: Duration) -> Result<()> {
        self.write_lock().insert(id.to_string(), Session::new(ttl));
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Session> {
        self.read_lock()
            .get(id)
            .cloned()
            .ok_or(SessionError::NoRecord)
    }

    fn update(&self, id: &str, mutator: &mut dyn FnMut(&mut Session)) -> Result<()> {
        let mut sessions = self.write_lock();
        let session = sessions.get_mut(id).ok_or(SessionError::NoRecord)?;
        mutator(session);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.write_lock().remove(id);
        Ok(())
    }

    fn evict_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut sessions = self.write_lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        let evicted = before - sessions.len();

        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted expired in-memory sessions");
        }
        Ok(evicted)
    }

    fn session_count(&self) -> Result<usize> {
        Ok(self.read_lock().len())
    }
}
