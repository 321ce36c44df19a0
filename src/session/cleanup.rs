//! Background session housekeeping.
//!
//! Periodically evicts expired sessions and reclaims backend storage.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::store::SessionStore;

/// Default sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600; // 1 hour

/// Default storage reclamation interval in seconds.
pub const DEFAULT_RECLAIM_INTERVAL_SECS: u64 = 1800; // 30 minutes

/// Zero selects the default sweep interval.
pub fn effective_sweep_interval(secs: u64) -> Duration {
    Duration::from_secs(if secs == 0 { DEFAULT_SWEEP_INTERVAL_SECS } else { secs })
}

/// Zero selects the default reclamation interval.
pub fn effective_reclaim_interval(secs: u64) -> Duration {
    Duration::from_secs(if secs == 0 { DEFAULT_RECLAIM_INTERVAL_SECS } else { secs })
}

/// Spawn a background task that periodically removes expired sessions.
///
/// Returns a `JoinHandle` that can be used to abort the task.
pub fn spawn_sweep_task(store: Arc<dyn SessionStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let task_store = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || task_store.evict_expired()).await {
                Ok(Ok(count)) => {
                    if count > 0 {
                        info!(evicted = count, "Session sweep completed");
                    } else {
                        debug!("Session sweep: no expired sessions");
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Session sweep failed");
                }
                Err(e) => {
                    warn!(error = %e, "Session sweep task panicked");
                }
            }

            // Log session count periodically for observability
            match store.session_count() {
                Ok(count) => {
                    debug!(sessions = count, "Session store status");
                }
                Err(e) => {
                    debug!(error = %e, "Failed to get session count");
                }
            }
        }
    })
}

/// Spawn a background task that periodically reclaims backend storage.
pub fn spawn_reclaim_task(store: Arc<dyn SessionStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let task_store = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || task_store.reclaim()).await {
                Ok(Ok(reclaimed)) => {
                    debug!(reclaimed, "Session storage reclamation completed");
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Session storage reclamation failed");
                }
                Err(e) => {
                    warn!(error = %e, "Session storage reclamation task panicked");
                }
            }
        }
    })
}

/// Owns the background tasks of one store.
///
/// Tasks run until [`Housekeeper::shutdown`] is called or the handle is dropped.
#[derive(Debug)]
pub struct Housekeeper {
    tasks: Vec<JoinHandle<()>>,
}

impl Housekeeper {
    /// Start the expiry sweep, and storage reclamation when `reclaim_interval`
    /// is given. Must be called from within a tokio runtime, with non-zero
    /// intervals (see [`effective_sweep_interval`]).
    pub fn start(
        store: Arc<dyn SessionStore>,
        sweep_interval: Duration,
        reclaim_interval: Option<Duration>,
    ) -> Self {
        let mut tasks = vec![spawn_sweep_task(Arc::clone(&store), sweep_interval)];
        if let Some(period) = reclaim_interval {
            tasks.push(spawn_reclaim_task(store, period));
        }

        info!(
            sweep_interval_secs = sweep_interval.as_secs(),
            reclaim_interval_secs = reclaim_interval.map(|d| d.as_secs()),
            "Started session housekeeping"
        );

        Self { tasks }
    }

    /// Number of tasks still running.
    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Abort all tasks and wait for them to stop.
    pub async fn shutdown(mut self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        debug!("Session housekeeping stopped");
    }
}

impl Drop for Housekeeper {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
