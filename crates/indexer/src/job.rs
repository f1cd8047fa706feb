//! Indexer jobs: one bounded scan-decode-apply pass per tick.
//!
//! A job owns its cursor. A run scans one batch window, applies every log
//! through its processor, and advances the cursor only after the whole
//! window has been applied. Decode failures skip the single log; storage
//! or RPC failures abort the run with the cursor untouched, so the next
//! run re-scans and the idempotent writes absorb the replay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use chainwatch_chain::client::ChainClient;
use chainwatch_chain::scanner::{batch_window, BlockTimestamps, LogScanner};
use chainwatch_core::config::{ChainConfig, IndexerSettings};
use chainwatch_storage::stores::CursorStore;

use crate::error::IndexerResult;
use crate::process::{Applied, LogProcessor};

/// Outcome of one job run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A window was scanned and applied
    Completed(RunSummary),
    /// The chain has not advanced past the cursor
    NoNewBlocks,
    /// A previous run of the same job was still in flight
    SkippedOverlap,
}

/// Counters for one completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Job name
    pub job: String,

    /// Scanned window, inclusive
    pub window: (u64, u64),

    /// Logs that wrote fresh rows
    pub processed: u64,

    /// Logs already applied by an earlier run
    pub deduped: u64,

    /// Items skipped with a warning (undecodable logs; failed subjects in
    /// a recompute)
    pub skipped: u64,
}

/// A named unit of scheduled work
#[async_trait]
pub trait IndexerJob: Send + Sync {
    /// Stable job name, also the cursor key
    fn name(&self) -> &str;

    /// How often the scheduler triggers this job
    fn cadence(&self) -> Duration;

    /// Execute one run.
    ///
    /// # Errors
    ///
    /// Returns error when the run aborted; the cursor was not advanced.
    async fn run_once(&self) -> IndexerResult<RunOutcome>;
}

/// A scan job pairing one [`LogProcessor`] with the chain and a cursor
pub struct ScanJob {
    name: String,
    cadence: Duration,
    client: Arc<dyn ChainClient>,
    scanner: LogScanner,
    processor: Arc<dyn LogProcessor>,
    cursors: Arc<dyn CursorStore>,
    deployment_block: Option<u64>,
    lookback_window: u64,
    max_blocks_per_run: u64,
    running: AtomicBool,
}

impl ScanJob {
    /// Assemble a scan job from its parts
    pub fn new(
        name: impl Into<String>,
        cadence: Duration,
        client: Arc<dyn ChainClient>,
        processor: Arc<dyn LogProcessor>,
        cursors: Arc<dyn CursorStore>,
        chain: &ChainConfig,
        settings: &IndexerSettings,
    ) -> Self {
        Self {
            name: name.into(),
            cadence,
            scanner: LogScanner::new(Arc::clone(&client)),
            client,
            processor,
            cursors,
            deployment_block: chain.deployment_block,
            lookback_window: chain.lookback_window,
            max_blocks_per_run: settings.max_blocks_per_run,
            running: AtomicBool::new(false),
        }
    }

    /// First block of the next window: one past the cursor, or a safe
    /// starting point when the job has never run
    async fn start_block(&self, head: u64) -> IndexerResult<u64> {
        if let Some(last) = self.cursors.get(&self.name).await? {
            return Ok(last.saturating_add(1));
        }
        Ok(self
            .deployment_block
            .unwrap_or_else(|| head.saturating_sub(self.lookback_window)))
    }

    async fn scan_and_apply(&self) -> IndexerResult<RunOutcome> {
        let head = self.client.block_number().await?;
        let from = self.start_block(head).await?;
        let Some((from, to)) = batch_window(from, head, self.max_blocks_per_run) else {
            debug!(job = %self.name, head, "no new blocks");
            return Ok(RunOutcome::NoNewBlocks);
        };

        let logs = self
            .scanner
            .scan(self.processor.contract(), &self.processor.filters(), from, to)
            .await?;

        let mut timestamps = BlockTimestamps::new();
        let mut processed = 0u64;
        let mut deduped = 0u64;
        let mut skipped = 0u64;

        for log in &logs {
            let block = log.block_number.map_or(to, |n| n.as_u64());
            let timestamp = timestamps.get(self.client.as_ref(), block).await?;
            match self.processor.process(log, timestamp).await {
                Ok(Applied::Processed) => processed += 1,
                Ok(Applied::AlreadySeen) => deduped += 1,
                Err(err @ crate::error::IndexerError::Decode { .. }) => {
                    warn!(
                        job = %self.name,
                        tx_hash = ?log.transaction_hash,
                        log_index = ?log.log_index,
                        error = %err,
                        "skipping undecodable log"
                    );
                    skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        // Cursor moves only after every write for the window succeeded.
        self.cursors.set(&self.name, to).await?;

        let summary = RunSummary {
            job: self.name.clone(),
            window: (from, to),
            processed,
            deduped,
            skipped,
        };
        info!(
            job = %summary.job,
            from = summary.window.0,
            to = summary.window.1,
            processed = summary.processed,
            deduped = summary.deduped,
            skipped = summary.skipped,
            "scan run completed"
        );
        Ok(RunOutcome::Completed(summary))
    }
}

#[async_trait]
impl IndexerJob for ScanJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    async fn run_once(&self) -> IndexerResult<RunOutcome> {
        // Overlap guard: a slow run must never race a fresh tick of the
        // same job.
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(job = %self.name, "previous run still in flight, skipping tick");
            return Ok(RunOutcome::SkippedOverlap);
        }

        let result = self.scan_and_apply().await;
        self.running.store(false, Ordering::Release);
        result
    }
}
