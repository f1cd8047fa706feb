//! Scheduler cadence and cooperative shutdown behavior.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use chainwatch_indexer::error::IndexerResult;
use chainwatch_indexer::{IndexerJob, IndexerSuite, RunOutcome, Scheduler};

/// Job that counts run starts and completions, optionally blocking each
/// run until released through the gate.
struct CountingJob {
    started: AtomicU32,
    completed: AtomicU32,
    gate: Option<Arc<Notify>>,
}

impl CountingJob {
    fn free_running() -> Arc<Self> {
        Arc::new(Self {
            started: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            gate: None,
        })
    }

    fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            started: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            gate: Some(gate),
        })
    }
}

#[async_trait]
impl IndexerJob for CountingJob {
    fn name(&self) -> &str {
        "counting"
    }

    fn cadence(&self) -> Duration {
        Duration::from_millis(5)
    }

    async fn run_once(&self) -> IndexerResult<RunOutcome> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(RunOutcome::NoNewBlocks)
    }
}

#[tokio::test]
async fn suite_runs_jobs_on_their_cadence() {
    let job = CountingJob::free_running();

    let mut suite = IndexerSuite::new();
    suite.register(Arc::clone(&job) as Arc<dyn IndexerJob>);
    suite.start();

    tokio::time::sleep(Duration::from_millis(40)).await;
    suite.shutdown().await;

    // First tick fires immediately, then every 5ms.
    let runs = job.completed.load(Ordering::SeqCst);
    assert!(runs >= 2, "expected repeated ticks, saw {runs}");

    // No further ticks after shutdown.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(job.completed.load(Ordering::SeqCst), runs);
}

#[tokio::test]
async fn shutdown_waits_for_the_in_flight_run() {
    let gate = Arc::new(Notify::new());
    let job = CountingJob::gated(Arc::clone(&gate));

    let mut scheduler = Scheduler::new();
    scheduler.spawn(Arc::clone(&job) as Arc<dyn IndexerJob>);

    // Wait for the first tick to enter the gated run.
    while job.started.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    let waiter = tokio::spawn(scheduler.shutdown());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished(), "shutdown must wait for the run");
    assert_eq!(job.completed.load(Ordering::SeqCst), 0);

    gate.notify_one();
    waiter.await.unwrap();
    assert_eq!(job.completed.load(Ordering::SeqCst), 1);

    // The stopped task fires no further ticks.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(job.started.load(Ordering::SeqCst), 1);
}
