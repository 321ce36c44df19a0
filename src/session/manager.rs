//! Session manager: identifier issuance, validation, renewal and data access.

use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cleanup::{effective_sweep_interval, Housekeeper, DEFAULT_SWEEP_INTERVAL_SECS};
use super::cookie::SessionCookie;
use super::error::{Result, SessionError};
use super::memory::MemoryStore;
use super::store::SessionStore;
use super::types::{deadline, SessionId, Validation};
use crate::config::SessionConfig;

/// Request-scoped binding between one inbound request and its session.
///
/// Starts unbound; [`SessionManager::register`] binds it. Data operations on
/// an unbound context fail with `NilContext`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    id: Option<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context already bound to `id`.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()) }
    }

    /// The bound session identifier, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn require(&self) -> Result<&str> {
        self.id.as_deref().ok_or(SessionError::NilContext)
    }

    fn bind(&mut self, id: String) {
        self.id = Some(id);
    }
}

/// Issues, validates and renews session identifiers over a [`SessionStore`].
///
/// Holds no record state between calls; every operation goes through the store.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    expiry: Duration,
    idle_timeout: Duration,
    cookie_name: String,
    /// Background tasks for a store this manager created itself.
    _housekeeper: Option<Housekeeper>,
}

impl SessionManager {
    /// Create a manager over `store`, or over a fresh [`MemoryStore`] when none
    /// is given.
    ///
    /// A self-created store is swept in the background when this is called
    /// from within a tokio runtime.
    pub fn new(store: Option<Arc<dyn SessionStore>>, config: &SessionConfig) -> Self {
        let (store, housekeeper) = match store {
            Some(store) => (store, None),
            None => {
                let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
                let housekeeper = match tokio::runtime::Handle::try_current() {
                    Ok(_) => Some(Housekeeper::start(
                        Arc::clone(&store),
                        effective_sweep_interval(config.store.sweep_interval_secs),
                        None,
                    )),
                    Err(_) => {
                        warn!(
                            default_interval_secs = DEFAULT_SWEEP_INTERVAL_SECS,
                            "No tokio runtime, in-memory session store will not be swept"
                        );
                        None
                    }
                };
                (store, housekeeper)
            }
        };

        Self {
            store,
            expiry: config.expiry(),
            idle_timeout: config.idle_timeout(),
            cookie_name: config.cookie_name.clone(),
            _housekeeper: housekeeper,
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Classify the record stored under `id`.
    pub fn validate(&self, id: &str) -> Result<Validation> {
        let session = match self.store.read(id) {
            Ok(session) => session,
            Err(SessionError::NoRecord) => return Ok(Validation::Invalid),
            Err(e) => return Err(e),
        };

        let now = Utc::now();
        if session.is_expired_at(now) {
            return Ok(Validation::Expired);
        }
        if session.is_idle_at(now, self.idle_timeout) {
            return Ok(Validation::Idle);
        }
        Ok(Validation::Valid)
    }

    /// Resolve the session for an incoming request and bind it to `ctx`.
    ///
    /// `inbound` is the identifier presented by the caller, if any; an empty
    /// string counts as none. Returns the cookie to send back when a new
    /// identifier was issued, and `None` when the presented one stays valid.
    pub fn register(
        &self,
        ctx: &mut SessionContext,
        inbound: Option<&str>,
    ) -> Result<Option<SessionCookie>> {
        let Some(id) = inbound.filter(|id| !id.is_empty()) else {
            let id = self.issue()?;
            debug!(session_id = %id, "Issued session for request without identifier");
            return Ok(Some(self.bind_new(ctx, id)));
        };

        let state = self.validate(id)?;
        debug!(session_id = %id, state = %state, "Validated session");

        match state {
            Validation::Valid => {
                self.store.update(id, &mut |s| s.touch())?;
                ctx.bind(id.to_string());
                Ok(None)
            }
            Validation::Idle => {
                let renewed = self.renew(id)?;
                Ok(Some(self.bind_new(ctx, renewed)))
            }
            Validation::Expired => {
                self.store.delete(id)?;
                let fresh = self.issue()?;
                debug!(old = %id, session_id = %fresh, "Replaced expired session");
                Ok(Some(self.bind_new(ctx, fresh)))
            }
            Validation::Invalid => {
                let fresh = self.issue()?;
                debug!(session_id = %fresh, "Replaced unknown session identifier");
                Ok(Some(self.bind_new(ctx, fresh)))
            }
        }
    }

    /// Set a data value on the bound session.
    pub fn set(
        &self,
        ctx: &SessionContext,
        key: &str,
        value: impl Into<serde_json::Value>,
    ) -> Result<()> {
        let id = ctx.require()?;
        let mut value = Some(value.into());
        self.store.update(id, &mut |s| {
            if let Some(value) = value.take() {
                s.data.insert(key.to_string(), value);
            }
        })
    }

    /// Get a data value from the bound session.
    pub fn get(&self, ctx: &SessionContext, key: &str) -> Result<serde_json::Value> {
        let id = ctx.require()?;
        let mut session = self.store.read(id)?;
        session.data.remove(key).ok_or(SessionError::KeyInvalid)
    }

    /// Get a data value converted to `T`.
    pub fn get_as<T: DeserializeOwned>(&self, ctx: &SessionContext, key: &str) -> Result<T> {
        let value = self.get(ctx, key)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Remove a data key from the bound session. Removing an absent key is
    /// not an error.
    pub fn delete(&self, ctx: &SessionContext, key: &str) -> Result<()> {
        let id = ctx.require()?;
        self.store.update(id, &mut |s| {
            s.data.remove(key);
        })
    }

    /// Current token of the bound session.
    pub fn token(&self, ctx: &SessionContext) -> Result<String> {
        let id = ctx.require()?;
        Ok(self.store.read(id)?.token)
    }

    /// Replace the token of the bound session.
    pub fn set_token(&self, ctx: &SessionContext, token: impl Into<String>) -> Result<()> {
        let id = ctx.require()?;
        let token = token.into();
        self.store.update(id, &mut |s| s.token.clone_from(&token))
    }

    /// Push the bound session's expiry to the configured duration from now.
    ///
    /// Returns a cookie for the same identifier carrying the new expiry.
    pub fn reset(&self, ctx: &SessionContext) -> Result<SessionCookie> {
        let id = ctx.require()?;
        let expiry = self.expiry;
        let mut expires_at = None;
        self.store.update(id, &mut |s| {
            s.extend(expiry);
            expires_at = Some(s.expires_at);
        })?;

        let expires_at = expires_at.unwrap_or_else(|| deadline(Utc::now(), expiry));
        debug!(session_id = %id, %expires_at, "Extended session expiry");
        Ok(SessionCookie::new(&self.cookie_name, id, expires_at))
    }

    /// Discard the bound session and bind a fresh, empty one in its place.
    pub fn remove(&self, ctx: &mut SessionContext) -> Result<SessionCookie> {
        let old = ctx.require()?.to_string();
        self.store.delete(&old)?;
        let fresh = self.issue()?;
        info!(old = %old, session_id = %fresh, "Removed session");
        Ok(self.bind_new(ctx, fresh))
    }

    /// Move the data of `id` to a new identifier with a cleared token and
    /// fresh timestamps, then delete the old record.
    fn renew(&self, id: &str) -> Result<String> {
        let old = self.store.read(id)?;
        let fresh = self.issue()?;

        let mut data = Some(old.data);
        self.store.update(&fresh, &mut |s| {
            if let Some(data) = data.take() {
                s.data = data;
            }
        })?;
        self.store.delete(id)?;

        debug!(old = %id, session_id = %fresh, "Renewed idle session");
        Ok(fresh)
    }

    /// Mint an identifier not currently in the store and create its record.
    fn issue(&self) -> Result<String> {
        let id = loop {
            let candidate = SessionId::new().to_hex();
            match self.store.read(&candidate) {
                Err(SessionError::NoRecord) => break candidate,
                Ok(_) => continue,
                Err(e) => return Err(e),
            }
        };
        self.store.create(&id, self.expiry)?;
        Ok(id)
    }

    fn bind_new(&self, ctx: &mut SessionContext, id: String) -> SessionCookie {
        let cookie = SessionCookie::new(&self.cookie_name, &id, deadline(Utc::now(), self.expiry));
        ctx.bind(id);
        cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::persistent::RedbStore;
    use serde_json::json;
    use tempfile::tempdir;

    fn manager() -> SessionManager {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        SessionManager::new(Some(store), &SessionConfig::default())
    }

    fn registered(manager: &SessionManager) -> SessionContext {
        let mut ctx = SessionContext::new();
        let cookie = manager.register(&mut ctx, None).unwrap();
        assert!(cookie.is_some());
        ctx
    }

    #[test]
    fn test_defaults() {
        let manager = manager();
        assert_eq!(manager.expiry(), Duration::hours(24));
        assert_eq!(manager.idle_timeout(), Duration::hours(1));
        assert_eq!(manager.cookie_name(), "session_id");
    }

    #[test]
    fn test_default_store_without_runtime() {
        let manager = SessionManager::new(None, &SessionConfig::default());
        let ctx = registered(&manager);
        assert_eq!(manager.store().session_count().unwrap(), 1);
        assert!(ctx.id().is_some());
    }

    #[tokio::test]
    async fn test_default_store_is_swept_inside_runtime() {
        let manager = SessionManager::new(None, &SessionConfig::default());
        assert!(manager._housekeeper.is_some());
    }

    #[test]
    fn test_new_request_issues_identifier() {
        let manager = manager();
        let mut ctx = SessionContext::new();

        let cookie = manager.register(&mut ctx, None).unwrap().unwrap();
        assert_eq!(ctx.id(), Some(cookie.value.as_str()));
        assert_eq!(cookie.name, "session_id");
        assert_eq!(cookie.path, "/");
        assert!(cookie.http_only);
        assert!(cookie.expires_at > Utc::now() + Duration::hours(23));
        assert_eq!(manager.validate(&cookie.value).unwrap(), Validation::Valid);
    }

    #[test]
    fn test_empty_identifier_counts_as_absent() {
        let manager = manager();
        let mut ctx = SessionContext::new();
        let cookie = manager.register(&mut ctx, Some("")).unwrap().unwrap();
        assert!(!cookie.value.is_empty());
    }

    #[test]
    fn test_valid_identifier_is_kept() {
        let manager = manager();
        let ctx = registered(&manager);
        let id = ctx.id().unwrap().to_string();

        manager
            .store()
            .update(&id, &mut |s| s.last_active = Utc::now() - Duration::minutes(5))
            .unwrap();
        let before = manager.store().read(&id).unwrap().last_active;

        let mut next = SessionContext::new();
        let cookie = manager.register(&mut next, Some(&id)).unwrap();
        assert!(cookie.is_none(), "valid session must not emit a cookie");
        assert_eq!(next.id(), Some(id.as_str()));
        assert!(manager.store().read(&id).unwrap().last_active > before);
    }

    #[test]
    fn test_unknown_identifier_is_replaced() {
        let manager = manager();
        let mut ctx = SessionContext::new();

        let cookie = manager.register(&mut ctx, Some("forged")).unwrap().unwrap();
        assert_ne!(cookie.value, "forged");
        assert_eq!(ctx.id(), Some(cookie.value.as_str()));
        assert!(matches!(
            manager.store().read("forged"),
            Err(SessionError::NoRecord)
        ));
    }

    #[test]
    fn test_expired_session_is_replaced_with_empty_one() {
        let manager = manager();
        let ctx = registered(&manager);
        let old = ctx.id().unwrap().to_string();
        manager.set(&ctx, "user", "alice").unwrap();
        manager
            .store()
            .update(&old, &mut |s| s.expires_at = Utc::now() - Duration::days(3))
            .unwrap();
        assert_eq!(manager.validate(&old).unwrap(), Validation::Expired);

        let mut next = SessionContext::new();
        let cookie = manager.register(&mut next, Some(&old)).unwrap().unwrap();
        assert_ne!(cookie.value, old);
        assert!(matches!(manager.get(&next, "user"), Err(SessionError::KeyInvalid)));
        assert!(matches!(manager.store().read(&old), Err(SessionError::NoRecord)));
    }

    #[test]
    fn test_idle_session_is_renewed_with_data() {
        let manager = manager();
        let ctx = registered(&manager);
        let old = ctx.id().unwrap().to_string();
        manager.set(&ctx, "user", "alice").unwrap();
        manager.set_token(&ctx, "claim").unwrap();
        manager
            .store()
            .update(&old, &mut |s| s.last_active = Utc::now() - Duration::hours(2))
            .unwrap();
        assert_eq!(manager.validate(&old).unwrap(), Validation::Idle);

        let mut next = SessionContext::new();
        let cookie = manager.register(&mut next, Some(&old)).unwrap().unwrap();
        assert_ne!(cookie.value, old);
        assert_eq!(next.id(), Some(cookie.value.as_str()));

        assert_eq!(manager.token(&next).unwrap(), "");
        assert_eq!(manager.get(&next, "user").unwrap(), json!("alice"));
        let renewed = manager.store().read(&cookie.value).unwrap();
        assert!((Utc::now() - renewed.last_active) < Duration::seconds(2));
        assert!(renewed.expires_at > Utc::now() + Duration::hours(23));

        assert!(matches!(manager.store().read(&old), Err(SessionError::NoRecord)));
    }

    #[test]
    fn test_data_operations_require_context() {
        let manager = manager();
        let mut ctx = SessionContext::new();

        assert!(matches!(manager.set(&ctx, "k", 1), Err(SessionError::NilContext)));
        assert!(matches!(manager.get(&ctx, "k"), Err(SessionError::NilContext)));
        assert!(matches!(manager.delete(&ctx, "k"), Err(SessionError::NilContext)));
        assert!(matches!(manager.token(&ctx), Err(SessionError::NilContext)));
        assert!(matches!(manager.set_token(&ctx, "t"), Err(SessionError::NilContext)));
        assert!(matches!(manager.reset(&ctx), Err(SessionError::NilContext)));
        assert!(matches!(manager.remove(&mut ctx), Err(SessionError::NilContext)));
    }

    #[test]
    fn test_operations_on_vanished_record_report_no_record() {
        let manager = manager();
        let ctx = registered(&manager);
        manager.store().delete(ctx.id().unwrap()).unwrap();

        assert!(matches!(manager.set(&ctx, "k", 1), Err(SessionError::NoRecord)));
        assert!(matches!(manager.get(&ctx, "k"), Err(SessionError::NoRecord)));
        assert!(matches!(manager.token(&ctx), Err(SessionError::NoRecord)));
        assert!(matches!(manager.reset(&ctx), Err(SessionError::NoRecord)));
    }

    #[test]
    fn test_token() {
        let manager = manager();
        let ctx = registered(&manager);

        assert_eq!(manager.token(&ctx).unwrap(), "");
        manager.set_token(&ctx, "bearer-claim").unwrap();
        assert_eq!(manager.token(&ctx).unwrap(), "bearer-claim");
    }

    #[test]
    fn test_typed_get() {
        let manager = manager();
        let ctx = registered(&manager);

        manager.set(&ctx, "count", 3).unwrap();
        manager.set(&ctx, "roles", json!(["admin", "ops"])).unwrap();

        assert_eq!(manager.get_as::<u32>(&ctx, "count").unwrap(), 3);
        assert_eq!(
            manager.get_as::<Vec<String>>(&ctx, "roles").unwrap(),
            vec!["admin".to_string(), "ops".to_string()]
        );
        assert!(matches!(
            manager.get_as::<u32>(&ctx, "roles"),
            Err(SessionError::ValueType(_))
        ));
    }

    #[test]
    fn test_reset_extends_expiry() {
        let manager = manager();
        let ctx = registered(&manager);
        let id = ctx.id().unwrap().to_string();
        manager
            .store()
            .update(&id, &mut |s| s.expires_at = Utc::now() + Duration::minutes(1))
            .unwrap();

        let cookie = manager.reset(&ctx).unwrap();
        assert_eq!(cookie.value, id);
        let stored = manager.store().read(&id).unwrap();
        assert_eq!(stored.expires_at, cookie.expires_at);
        assert!(stored.expires_at > Utc::now() + Duration::hours(23));
    }

    #[test]
    fn test_remove_mints_replacement() {
        let manager = manager();
        let mut ctx = registered(&manager);
        let old = ctx.id().unwrap().to_string();
        manager.set(&ctx, "user", "alice").unwrap();

        let cookie = manager.remove(&mut ctx).unwrap();
        assert_ne!(cookie.value, old);
        assert_eq!(ctx.id(), Some(cookie.value.as_str()));
        assert!(matches!(manager.store().read(&old), Err(SessionError::NoRecord)));
        assert!(matches!(manager.get(&ctx, "user"), Err(SessionError::KeyInvalid)));
    }

    fn scenario(manager: &SessionManager) {
        manager.store().create("A", Duration::hours(24)).unwrap();
        let mut ctx = SessionContext::with_id("A");

        manager.set(&ctx, "user", "alice").unwrap();
        assert_eq!(manager.get(&ctx, "user").unwrap(), json!("alice"));
        manager.delete(&ctx, "user").unwrap();
        assert!(matches!(manager.get(&ctx, "user"), Err(SessionError::KeyInvalid)));

        manager.remove(&mut ctx).unwrap();
        assert!(matches!(manager.store().read("A"), Err(SessionError::NoRecord)));
        assert_ne!(ctx.id(), Some("A"));
    }

    #[test]
    fn test_scenario_memory_store() {
        scenario(&manager());
    }

    #[test]
    fn test_scenario_persistent_store() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(RedbStore::open(dir.path()).unwrap());
        scenario(&SessionManager::new(Some(store), &SessionConfig::default()));
    }

    #[test]
    fn test_full_lifecycle_persistent_store() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(RedbStore::open(dir.path()).unwrap());
        let manager = SessionManager::new(Some(store), &SessionConfig::default());

        let ctx = registered(&manager);
        let id = ctx.id().unwrap().to_string();
        manager.set(&ctx, "user", "alice").unwrap();
        manager.set_token(&ctx, "claim").unwrap();

        let mut again = SessionContext::new();
        assert!(manager.register(&mut again, Some(&id)).unwrap().is_none());
        assert_eq!(manager.token(&again).unwrap(), "claim");

        manager
            .store()
            .update(&id, &mut |s| s.last_active = Utc::now() - Duration::hours(2))
            .unwrap();
        let mut renewed = SessionContext::new();
        let cookie = manager.register(&mut renewed, Some(&id)).unwrap().unwrap();
        assert_ne!(cookie.value, id);
        assert_eq!(manager.get(&renewed, "user").unwrap(), json!("alice"));
        assert_eq!(manager.token(&renewed).unwrap(), "");
        assert_eq!(manager.store().session_count().unwrap(), 1);
    }
}
