//! Session manager and store configuration.

use anyhow::Context;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::session::cleanup::{effective_reclaim_interval, effective_sweep_interval, Housekeeper};
use crate::session::persistent::DEFAULT_STORE_DIR;
use crate::session::{MemoryStore, RedbStore, SessionStore};

/// Default session lifetime in seconds (24 hours).
pub const DEFAULT_EXPIRY_SECS: u64 = 24 * 60 * 60;

/// Default idle timeout in seconds (1 hour).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60 * 60;

/// Session manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Absolute session lifetime in seconds (0 = default: 24 hours).
    #[serde(default = "default_expiry")]
    pub expiry_secs: u64,

    /// Inactivity window in seconds before renewal (0 = default: 1 hour).
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Cookie name the transport uses for the session ID.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Session store backend.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redb,
}

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory holding the redb database file.
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,

    /// Expiry sweep interval in seconds (0 = default: 1 hour).
    #[serde(default)]
    pub sweep_interval_secs: u64,

    /// Storage reclamation interval in seconds, redb only (0 = default: 30 minutes).
    #[serde(default)]
    pub reclaim_interval_secs: u64,
}

fn default_expiry() -> u64 {
    DEFAULT_EXPIRY_SECS
}

fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_cookie_name() -> String {
    "session_id".to_string()
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_DIR)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_secs: default_expiry(),
            idle_timeout_secs: default_idle_timeout(),
            cookie_name: default_cookie_name(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            dir: default_store_dir(),
            sweep_interval_secs: 0,
            reclaim_interval_secs: 0,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cookie_name.is_empty() {
            return Err("cookie_name must not be empty".to_string());
        }

        if self
            .cookie_name
            .chars()
            .any(|c| c == ';' || c == '=' || c == ',' || c.is_whitespace() || c.is_control())
        {
            return Err(format!("cookie_name contains invalid characters: {:?}", self.cookie_name));
        }

        Ok(())
    }

    /// Session lifetime, with zero mapped to the default.
    pub fn expiry(&self) -> Duration {
        secs_or_default(self.expiry_secs, DEFAULT_EXPIRY_SECS)
    }

    /// Idle timeout, with zero mapped to the default.
    pub fn idle_timeout(&self) -> Duration {
        secs_or_default(self.idle_timeout_secs, DEFAULT_IDLE_TIMEOUT_SECS)
    }
}

fn secs_or_default(secs: u64, default: u64) -> Duration {
    let secs = if secs == 0 { default } else { secs };
    Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)).unwrap_or(Duration::MAX)
}

/// A constructed store together with its running background tasks.
pub struct OpenedStore {
    pub store: Arc<dyn SessionStore>,
    pub housekeeper: Housekeeper,
}

impl StoreConfig {
    /// Build the configured backend and start its housekeeping.
    ///
    /// Must be called from within a tokio runtime. Failing to open the
    /// persistent database is fatal.
    pub fn open(&self) -> anyhow::Result<OpenedStore> {
        let sweep = effective_sweep_interval(self.sweep_interval_secs);

        let store: Arc<dyn SessionStore> = match self.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Redb => Arc::new(RedbStore::open(&self.dir)?),
        };
        // The in-memory map has no storage to reclaim.
        let reclaim = (self.backend == StoreBackend::Redb)
            .then(|| effective_reclaim_interval(self.reclaim_interval_secs));

        let housekeeper = Housekeeper::start(Arc::clone(&store), sweep, reclaim);
        Ok(OpenedStore { store, housekeeper })
    }
}
