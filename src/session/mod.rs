//! Session management.
//!
//! This module provides opaque session identifiers backed by a pluggable
//! record store (in-memory or redb), with background expiry sweeps.

pub mod cleanup;
pub mod codec;
pub mod cookie;
pub mod error;
pub mod manager;
pub mod memory;
pub mod persistent;
pub mod store;
pub mod types;

pub use cleanup::{
    spawn_reclaim_task, spawn_sweep_task, Housekeeper, DEFAULT_RECLAIM_INTERVAL_SECS,
    DEFAULT_SWEEP_INTERVAL_SECS,
};
pub use cookie::{parse_session_cookie, SessionCookie};
pub use error::{Result, SessionError};
pub use manager::{SessionContext, SessionManager};
pub use memory::MemoryStore;
pub use persistent::RedbStore;
pub use store::SessionStore;
pub use types::{Session, SessionId, Validation};
