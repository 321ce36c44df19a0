//! Session store backed by the redb embedded database.
//!
//! Every store operation is one redb transaction keyed by the identifier
//! bytes. redb serializes write transactions, which gives `update` its
//! read-modify-write atomicity.

use anyhow::Context;
use chrono::{Duration, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use super::codec;
use super::error::{Result, SessionError};
use super::store::SessionStore;
use super::types::Session;

/// redb table for sessions (key: identifier bytes, value: MessagePack record).
const SESSIONS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("sessions");

/// Directory used when none is configured.
pub const DEFAULT_STORE_DIR: &str = "session";

/// Database file name inside the store directory.
pub const DATABASE_FILE: &str = "sessions.redb";

/// Session store with persistent storage.
pub struct RedbStore {
    /// Shared for transactions, exclusive only while compacting.
    db: RwLock<Database>,

    path: PathBuf,
}

impl RedbStore {
    /// Open or create a session store in `dir`.
    ///
    /// An empty path selects [`DEFAULT_STORE_DIR`].
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = match dir.as_ref() {
            d if d.as_os_str().is_empty() => Path::new(DEFAULT_STORE_DIR),
            d => d,
        };

        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {:?}", dir))?;

        let path = dir.join(DATABASE_FILE);
        let db = Database::create(&path)
            .with_context(|| format!("Failed to open session database: {:?}", path))?;

        // Initialize tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SESSIONS_TABLE)?;
        }
        write_txn.commit()?;

        info!(path = ?path, "Opened persistent session store");

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn db(&self) -> RwLockReadGuard<'_, Database> {
        self.db.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist a record as-is, bypassing the fresh-record defaults of `create`.
    fn persist(&self, id: &str, session: &Session) -> Result<()> {
        let data = codec::encode(session)?;
        let db = self.db();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;
            table.insert(id.as_bytes(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl SessionStore for RedbStore {
    fn create(&self, id: &str, ttl: Duration) -> Result<()> {
        self.persist(id, &Session::new(ttl))
    }

    fn read(&self, id: &str) -> Result<Session> {
        let db = self.db();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SESSIONS_TABLE)?;

        let value = table.get(id.as_bytes())?.ok_or(SessionError::NoRecord)?;
        codec::decode(value.value())
    }

    fn update(&self, id: &str, mutator: &mut dyn FnMut(&mut Session)) -> Result<()> {
        let db = self.db();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;

            // Returning early drops the transaction, which aborts it.
            let mut session = match table.get(id.as_bytes())? {
                Some(value) => codec::decode(value.value())?,
                None => return Err(SessionError::NoRecord),
            };

            mutator(&mut session);

            let data = codec::encode(&session)?;
            table.insert(id.as_bytes(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let db = self.db();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;
            table.remove(id.as_bytes())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn evict_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let db = self.db();
        let write_txn = db.begin_write()?;
        let evicted = {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;

            let mut expired: Vec<Vec<u8>> = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                match codec::decode(value.value()) {
                    Ok(session) if session.is_expired_at(now) => {
                        expired.push(key.value().to_vec());
                    }
                    Err(e) => {
                        warn!(
                            key = %String::from_utf8_lossy(key.value()),
                            error = %e,
                            "Failed to decode session, marking for deletion"
                        );
                        expired.push(key.value().to_vec());
                    }
                    _ => {}
                }
            }

            for key in &expired {
                table.remove(key.as_slice())?;
            }
            expired.len()
        };
        write_txn.commit()?;

        if evicted > 0 {
            debug!(evicted, "Evicted expired persistent sessions");
        }
        Ok(evicted)
    }

    fn session_count(&self) -> Result<usize> {
        let db = self.db();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SESSIONS_TABLE)?;
        Ok(table.len()? as usize)
    }

    /// Compact the database file.
    ///
    /// Waits for in-flight transactions to finish and blocks new ones while
    /// compaction runs.
    fn reclaim(&self) -> Result<bool> {
        let mut db = self.db.write().unwrap_or_else(PoisonError::into_inner);
        let compacted = db.compact()?;
        if compacted {
            debug!(path = ?self.path, "Compacted session database");
        }
        Ok(compacted)
    }
}
