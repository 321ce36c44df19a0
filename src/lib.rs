//! Opaque session identifiers for stateless request/response protocols.
//!
//! A [`SessionManager`] issues, validates, renews and expires identifiers,
//! each backed by a record of key/value data held in a [`SessionStore`]:
//! either the in-memory [`MemoryStore`] or the redb-backed [`RedbStore`].
//! Transports carry identifiers in and out as [`SessionCookie`]s.

pub mod config;
pub mod session;

pub use config::{SessionConfig, StoreBackend, StoreConfig};
pub use session::{
    Housekeeper, MemoryStore, RedbStore, Session, SessionContext, SessionCookie, SessionError,
    SessionManager, SessionStore, Validation,
};
