//! Interval scheduler for indexer jobs.
//!
//! Each job gets its own tokio task ticking at the job's cadence. The
//! shutdown signal is observed between runs only: an in-flight run always
//! completes (and advances its cursor) before its task exits, so shutdown
//! never strands a half-applied window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::job::IndexerJob;

/// Drives registered jobs on their cadences until shutdown
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Create an idle scheduler
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Spawn the ticking task for one job
    pub fn spawn(&mut self, job: Arc<dyn IndexerJob>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let name = job.name().to_string();
        let cadence = job.cadence();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cadence.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(job = %name, cadence_secs = cadence.as_secs(), "job scheduled");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = job.run_once().await {
                            // A failed run leaves the cursor behind; the
                            // next tick retries the same window.
                            error!(job = %name, error = %err, "job run failed");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!(job = %name, "job stopped");
                            return;
                        }
                    }
                }
            }
        });
        self.handles.push(handle);
    }

    /// Signal shutdown and wait for every job task to finish its current
    /// run and exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "job task panicked");
            }
        }
        info!("scheduler stopped");
    }

    /// Number of spawned job tasks
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.handles.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
