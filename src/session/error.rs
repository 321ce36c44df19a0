//! Session error taxonomy.

use thiserror::Error;

/// Errors returned by session stores and the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A data operation ran before the request was bound to a session.
    #[error("request session context is nil")]
    NilContext,

    /// The requested data key is absent from the record.
    #[error("session data key does not exist or invalid")]
    KeyInvalid,

    /// The identifier is unknown to the store.
    #[error("session record does not exist or invalid")]
    NoRecord,

    /// The stored value could not be converted to the requested type.
    #[error("session value has an unexpected type: {0}")]
    ValueType(#[from] serde_json::Error),

    #[error("failed to encode session record: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode session record: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Persistent backend failure, surfaced verbatim.
    #[error("session store backend error: {0}")]
    Backend(#[from] redb::Error),
}

/// Result alias for session operations.
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

// redb reports a distinct error type per operation; all of them map onto
// `redb::Error`.
macro_rules! backend_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for SessionError {
                fn from(e: $ty) -> Self {
                    SessionError::Backend(redb::Error::from(e))
                }
            }
        )*
    };
}

backend_error!(
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    redb::CompactionError,
);
