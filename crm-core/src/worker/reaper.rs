use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info};

use crate::clock::Clock;
use crate::error::CrmResult;
use crate::store::TaskStore;

/// Background sweeper for expired day tasks.
///
/// Every task query already ignores rows past `expire_at`; the reaper only
/// keeps the table from growing.
pub struct TaskReaper {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,

    /// Sweep interval in seconds
    interval_seconds: u64,

    /// Cleared by [`TaskReaper::stop`]; the loop exits after the current sweep
    running: Arc<RwLock<bool>>,
}

impl TaskReaper {
    /// Creates a new task reaper.
    ///
    /// # Arguments
    ///
    /// * `store` - Task store to purge
    /// * `clock` - Source of "now" for deciding what has expired
    /// * `interval_seconds` - Pause between sweeps, at least one second
    ///
    /// # Returns
    ///
    /// Returns a stopped `TaskReaper`; call [`TaskReaper::start`] to run it.
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, interval_seconds: u64) -> Self {
        Self {
            store,
            clock,
            interval_seconds: interval_seconds.max(1),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Starts the sweep loop.
    ///
    /// Runs until [`TaskReaper::stop`] is called. A failed sweep is logged
    /// and retried on the next tick, so this never returns an error.
    pub async fn start(&self) {
        *self.running.write().await = true;
        info!(
            "TaskReaper started with interval: {} seconds",
            self.interval_seconds
        );

        while *self.running.read().await {
            if let Err(e) = self.sweep().await {
                error!("Task reaper sweep failed: {}", e);
            }
            sleep(Duration::from_secs(self.interval_seconds)).await;
        }

        info!("TaskReaper stopped");
    }

    pub async fn stop(&self) {
        info!("Stopping TaskReaper...");
        *self.running.write().await = false;
    }

    /// Deletes every task whose `expire_at` has passed.
    pub async fn sweep(&self) -> CrmResult<u64> {
        self.store.purge_expired(self.clock.now()).await
    }
}
