//! Indexer suite: job registry, wiring, and graceful shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use chainwatch_chain::client::ChainClient;
use chainwatch_core::config::ChainwatchConfig;
use chainwatch_storage::stores::{CursorStore, SessionStore, TransactionStore};

use crate::error::{IndexerError, IndexerResult};
use crate::job::{IndexerJob, RunOutcome, ScanJob};
use crate::process::{EscrowProcessor, RegistryProcessor, TransferProcessor};
use crate::scheduler::Scheduler;

/// Cursor key and job name of the escrow session job
pub const ESCROW_JOB: &str = "escrow-sessions";
/// Cursor key and job name of the token transfer job
pub const TRANSFER_JOB: &str = "token-transfers";
/// Cursor key and job name of the registry job
pub const REGISTRY_JOB: &str = "agent-registry";

/// Named collection of indexer jobs with one scheduler
pub struct IndexerSuite {
    jobs: HashMap<String, Arc<dyn IndexerJob>>,
    scheduler: Option<Scheduler>,
}

impl IndexerSuite {
    /// Create an empty suite
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            scheduler: None,
        }
    }

    /// Register a job under its own name
    pub fn register(&mut self, job: Arc<dyn IndexerJob>) {
        self.jobs.insert(job.name().to_string(), job);
    }

    /// Look up a registered job
    #[must_use]
    pub fn job(&self, name: &str) -> Option<Arc<dyn IndexerJob>> {
        self.jobs.get(name).cloned()
    }

    /// Registered job names, for operator tooling
    #[must_use]
    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Trigger one run of a named job, outside its schedule.
    ///
    /// # Errors
    ///
    /// Returns error for an unknown name or a failed run.
    pub async fn run_job_once(&self, name: &str) -> IndexerResult<RunOutcome> {
        let job = self
            .jobs
            .get(name)
            .ok_or_else(|| IndexerError::job(name, "no such job"))?;
        job.run_once().await
    }

    /// Start the scheduler over every registered job
    pub fn start(&mut self) {
        let mut scheduler = Scheduler::new();
        for job in self.jobs.values() {
            scheduler.spawn(Arc::clone(job));
        }
        info!(jobs = scheduler.job_count(), "indexer suite started");
        self.scheduler = Some(scheduler);
    }

    /// Stop the scheduler, letting in-flight runs complete
    pub async fn shutdown(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }
        info!("indexer suite stopped");
    }

    /// Run until the process receives SIGINT or SIGTERM, then shut down
    /// gracefully.
    ///
    /// # Errors
    ///
    /// Returns error if signal handler installation fails.
    pub async fn run_until_shutdown(&mut self) -> IndexerResult<()> {
        self.start();
        wait_for_signal().await?;
        self.shutdown().await;
        Ok(())
    }
}

impl Default for IndexerSuite {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the standard three-job suite from configuration and stores
#[must_use]
pub fn build_suite(
    config: &ChainwatchConfig,
    client: Arc<dyn ChainClient>,
    cursors: Arc<dyn CursorStore>,
    sessions: Arc<dyn SessionStore>,
    transactions: Arc<dyn TransactionStore>,
) -> IndexerSuite {
    let mut suite = IndexerSuite::new();

    suite.register(Arc::new(ScanJob::new(
        ESCROW_JOB,
        config.indexer.escrow_cadence,
        Arc::clone(&client),
        Arc::new(EscrowProcessor::new(config.chain.escrow_address, sessions)),
        Arc::clone(&cursors),
        &config.chain,
        &config.indexer,
    )));
    suite.register(Arc::new(ScanJob::new(
        TRANSFER_JOB,
        config.indexer.transfer_cadence,
        Arc::clone(&client),
        Arc::new(TransferProcessor::new(
            config.chain.token_address,
            config.chain.escrow_address,
            Arc::clone(&transactions),
        )),
        Arc::clone(&cursors),
        &config.chain,
        &config.indexer,
    )));
    suite.register(Arc::new(ScanJob::new(
        REGISTRY_JOB,
        config.indexer.registry_cadence,
        Arc::clone(&client),
        Arc::new(RegistryProcessor::new(
            config.chain.registry_address,
            transactions,
        )),
        cursors,
        &config.chain,
        &config.indexer,
    )));

    suite
}

#[cfg(unix)]
async fn wait_for_signal() -> IndexerResult<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| IndexerError::job("signals", e.to_string()))?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| IndexerError::job("signals", e.to_string()))?;
            info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> IndexerResult<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| IndexerError::job("signals", e.to_string()))?;
    info!("received interrupt, shutting down");
    Ok(())
}
