//! Session store maintenance daemon.
//!
//! Opens a persistent session store and keeps it tidy: expired sessions are
//! swept and the database file is compacted on fixed intervals.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use opaque_session::config::{SessionConfig, StoreBackend};
use opaque_session::session::{RedbStore, SessionStore};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "opaque-session")]
#[command(about = "Maintenance daemon for persistent session stores")]
struct Args {
    /// JSON configuration file
    #[arg(long, env = "SESSION_CONFIG")]
    config: Option<PathBuf>,

    /// Session store directory (overrides the config file)
    #[arg(long, env = "SESSION_STORE_DIR")]
    dir: Option<PathBuf>,

    /// Expiry sweep interval in seconds (0 = default)
    #[arg(long, env = "SESSION_SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,

    /// Storage reclamation interval in seconds (0 = default)
    #[arg(long, env = "SESSION_RECLAIM_INTERVAL_SECS")]
    reclaim_interval_secs: Option<u64>,

    /// Run one sweep and compaction, then exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging
    #[arg(short, long, env = "SESSION_VERBOSE")]
    verbose: bool,
}

impl Args {
    fn load_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_file(path)?,
            None => SessionConfig::default(),
        };

        // This tool only maintains on-disk stores.
        config.store.backend = StoreBackend::Redb;
        if let Some(dir) = &self.dir {
            config.store.dir = dir.clone();
        }
        if let Some(secs) = self.sweep_interval_secs {
            config.store.sweep_interval_secs = secs;
        }
        if let Some(secs) = self.reclaim_interval_secs {
            config.store.reclaim_interval_secs = secs;
        }

        config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
        Ok(config)
    }
}

/// Sweep and compact once.
fn run_once(store: &dyn SessionStore) -> Result<()> {
    let evicted = store.evict_expired()?;
    let compacted = store.reclaim()?;
    info!(
        evicted,
        compacted,
        sessions = store.session_count()?,
        "Session store maintenance completed"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("{}={}", env!("CARGO_CRATE_NAME"), log_level))
        .json()
        .init();

    info!("Starting session store maintenance");

    let config = args.load_config()?;

    info!(
        dir = ?config.store.dir,
        sweep_interval_secs = config.store.sweep_interval_secs,
        reclaim_interval_secs = config.store.reclaim_interval_secs,
        once = args.once,
        "Configuration loaded"
    );

    if args.once {
        let store = RedbStore::open(&config.store.dir)?;
        return run_once(&store);
    }

    let opened = config.store.open()?;

    match opened.store.session_count() {
        Ok(count) => info!(sessions = count, "Session store ready"),
        Err(e) => warn!(error = %e, "Failed to read session count"),
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    opened.housekeeper.shutdown().await;

    Ok(())
}
