//! MessagePack encoding for persisted session records.
//!
//! Records are written as positional arrays (`rmp_serde::to_vec`), so the
//! byte layout follows the field order of [`Session`].

use super::error::Result;
use super::types::Session;

pub fn encode(session: &Session) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(session)?)
}

pub fn decode(bytes: &[u8]) -> Result<Session> {
    Ok(rmp_serde::from_slice(bytes)?)
}
