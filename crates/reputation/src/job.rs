//! Scheduled bulk recompute job.
//!
//! Rides the same scheduler as the indexing jobs: one cadence, one
//! overlap guard, no cursor (scoring always reads the full outcome
//! history).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use chainwatch_indexer::error::{IndexerError, IndexerResult};
use chainwatch_indexer::job::{IndexerJob, RunOutcome, RunSummary};

use crate::engine::ReputationEngine;

/// Job name under which the recompute registers
pub const RECOMPUTE_JOB: &str = "reputation-recompute";

/// Periodic `recompute_all` wrapper around a [`ReputationEngine`]
pub struct RecomputeJob {
    engine: Arc<ReputationEngine>,
    cadence: Duration,
    running: AtomicBool,
}

impl RecomputeJob {
    /// Create the job over an engine with a recompute cadence
    #[must_use]
    pub fn new(engine: Arc<ReputationEngine>, cadence: Duration) -> Self {
        Self {
            engine,
            cadence,
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl IndexerJob for RecomputeJob {
    fn name(&self) -> &str {
        RECOMPUTE_JOB
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    async fn run_once(&self) -> IndexerResult<RunOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(job = RECOMPUTE_JOB, "previous recompute still in flight, skipping tick");
            return Ok(RunOutcome::SkippedOverlap);
        }

        let result = self.engine.recompute_all().await;
        self.running.store(false, Ordering::Release);

        let summary = result.map_err(|err| IndexerError::job(RECOMPUTE_JOB, err.to_string()))?;
        Ok(RunOutcome::Completed(RunSummary {
            job: RECOMPUTE_JOB.to_string(),
            window: (0, 0),
            processed: summary.scored,
            deduped: 0,
            skipped: summary.failed,
        }))
    }
}
