//! Reputation engine behavior over in-memory stores.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use ethers::types::{Address, U256};

use tokio::sync::Notify;

use chainwatch_core::config::ReputationConfig;
use chainwatch_core::types::{PaymentOutcome, PaymentStatus, ReputationScore};
use chainwatch_indexer::{IndexerJob, IndexerSuite, RunOutcome};
use chainwatch_reputation::{
    RecomputeJob, ReputationEngine, ReputationError, CALCULATION_VERSION, RECOMPUTE_JOB,
};
use chainwatch_storage::error::{StorageError, StorageResult};
use chainwatch_storage::stores::{PaymentStore, ReputationStore};
use chainwatch_storage::{Cache, MemoryCache, MemoryStore};

fn payment(subject: &str, payer: u8, status: PaymentStatus, latency_ms: u64) -> PaymentOutcome {
    PaymentOutcome {
        subject_id: subject.to_string(),
        status,
        latency_ms,
        payer: Address::repeat_byte(payer),
        amount: U256::from(1_000_000u64),
        occurred_at: Utc::now() - ChronoDuration::minutes(5),
    }
}

fn seed_spec_scenario(store: &MemoryStore, subject: &str) {
    // 100 payments: 95 succeeded, 3 failed, 2 timed out, all fast, 40
    // distinct payers of which 10 paid more than once.
    let mut n = 0u32;
    let mut push = |payer: u8| {
        n += 1;
        let status = match n {
            1..=3 => PaymentStatus::Failed,
            4..=5 => PaymentStatus::TimedOut,
            _ => PaymentStatus::Succeeded,
        };
        store.push_payment(payment(subject, payer, status, 800));
    };
    for payer in 1..=10u8 {
        for _ in 0..7 {
            push(payer);
        }
    }
    for payer in 11..=40u8 {
        push(payer);
    }
}

fn engine_over(store: &Arc<MemoryStore>, config: ReputationConfig) -> ReputationEngine {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(128).unwrap());
    ReputationEngine::new(
        Arc::clone(store) as Arc<dyn PaymentStore>,
        Arc::clone(store) as Arc<dyn ReputationStore>,
        cache,
        config,
    )
}

#[tokio::test]
async fn subject_without_history_gets_unpersisted_default() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store, ReputationConfig::default());

    let score = engine.calculate_score("svc-new").await.unwrap();
    assert!((score.reputation_score - 0.0).abs() < f64::EPSILON);
    assert!((score.recency_weight - 1.0).abs() < f64::EPSILON);
    assert!(engine.stored_score("svc-new").await.unwrap().is_none());
}

#[tokio::test]
async fn scoring_persists_a_versioned_snapshot() {
    let store = Arc::new(MemoryStore::new());
    seed_spec_scenario(&store, "svc-1");
    let engine = engine_over(&store, ReputationConfig::default());

    let score = engine.calculate_score("svc-1").await.unwrap();
    assert!((score.reliability_score - 86.0).abs() < 1e-9);
    assert!((score.speed_score - 100.0).abs() < f64::EPSILON);
    // Composite beats reliability's weighted contribution alone but never
    // reaches full marks.
    assert!(score.reputation_score > 0.40 * 86.0);
    assert!(score.reputation_score < 100.0);

    let stored = engine.stored_score("svc-1").await.unwrap().unwrap();
    assert_eq!(stored.calculation_version, CALCULATION_VERSION);
    assert!((stored.reputation_score - score.reputation_score).abs() < f64::EPSILON);
}

#[tokio::test]
async fn cached_score_is_served_until_invalidated() {
    let store = Arc::new(MemoryStore::new());
    store.push_payment(payment("svc-1", 0x01, PaymentStatus::Succeeded, 500));
    let engine = engine_over(&store, ReputationConfig::default());

    let first = engine.calculate_score("svc-1").await.unwrap();

    // New outcome lands but the cached entry is still fresh.
    store.push_payment(payment("svc-1", 0x02, PaymentStatus::Failed, 500));
    let cached = engine.calculate_score("svc-1").await.unwrap();
    assert!((cached.reputation_score - first.reputation_score).abs() < f64::EPSILON);

    engine.invalidate("svc-1").await;
    let recomputed = engine.calculate_score("svc-1").await.unwrap();
    assert!(recomputed.reputation_score < first.reputation_score);
}

/// Payment store that fails reads for one subject
struct FlakyPayments {
    inner: Arc<MemoryStore>,
    poisoned: String,
}

#[async_trait]
impl PaymentStore for FlakyPayments {
    async fn payments_for_subject(&self, subject_id: &str) -> StorageResult<Vec<PaymentOutcome>> {
        if subject_id == self.poisoned {
            return Err(StorageError::database("select_payments", "connection reset"));
        }
        self.inner.payments_for_subject(subject_id).await
    }

    async fn active_subjects(&self) -> StorageResult<Vec<String>> {
        self.inner.active_subjects().await
    }
}

#[tokio::test]
async fn recompute_all_isolates_per_subject_failures() {
    let store = Arc::new(MemoryStore::new());
    store.push_payment(payment("svc-good", 0x01, PaymentStatus::Succeeded, 500));
    store.push_payment(payment("svc-bad", 0x02, PaymentStatus::Succeeded, 500));

    let payments: Arc<dyn PaymentStore> = Arc::new(FlakyPayments {
        inner: Arc::clone(&store),
        poisoned: "svc-bad".to_string(),
    });
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(128).unwrap());
    let engine = ReputationEngine::new(
        payments,
        Arc::clone(&store) as Arc<dyn ReputationStore>,
        cache,
        ReputationConfig::default(),
    );

    let summary = engine.recompute_all().await.unwrap();
    assert_eq!(summary.scored, 1);
    assert_eq!(summary.failed, 1);
    assert!(engine.stored_score("svc-good").await.unwrap().is_some());
    assert!(engine.stored_score("svc-bad").await.unwrap().is_none());
    assert_eq!(store.ranking_refreshes(), 1);
}

/// Snapshot store that fails the first `failures` upserts
struct FlakySnapshots {
    inner: Arc<MemoryStore>,
    remaining_failures: AtomicU32,
}

#[async_trait]
impl ReputationStore for FlakySnapshots {
    async fn upsert_score(&self, score: &ReputationScore) -> StorageResult<()> {
        let left = self.remaining_failures.load(Ordering::Acquire);
        if left > 0 {
            self.remaining_failures.store(left - 1, Ordering::Release);
            return Err(StorageError::database("upsert_score", "deadlock detected"));
        }
        self.inner.upsert_score(score).await
    }

    async fn get_score(&self, subject_id: &str) -> StorageResult<Option<ReputationScore>> {
        self.inner.get_score(subject_id).await
    }

    async fn refresh_rankings(&self) -> StorageResult<()> {
        self.inner.refresh_rankings().await
    }
}

fn retrying_config() -> ReputationConfig {
    ReputationConfig {
        snapshot_retry_attempts: 3,
        snapshot_retry_delay: Duration::from_millis(1),
        ..ReputationConfig::default()
    }
}

#[tokio::test]
async fn snapshot_write_retries_through_transient_failures() {
    let store = Arc::new(MemoryStore::new());
    store.push_payment(payment("svc-1", 0x01, PaymentStatus::Succeeded, 500));

    let scores: Arc<dyn ReputationStore> = Arc::new(FlakySnapshots {
        inner: Arc::clone(&store),
        remaining_failures: AtomicU32::new(2),
    });
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(128).unwrap());
    let engine = ReputationEngine::new(
        Arc::clone(&store) as Arc<dyn PaymentStore>,
        scores,
        cache,
        retrying_config(),
    );

    let score = engine.calculate_score("svc-1").await.unwrap();
    assert!(score.reputation_score > 0.0);
    assert!(store.get_score("svc-1").await.unwrap().is_some());
}

#[tokio::test]
async fn snapshot_write_fails_after_retry_budget() {
    let store = Arc::new(MemoryStore::new());
    store.push_payment(payment("svc-1", 0x01, PaymentStatus::Succeeded, 500));

    let scores: Arc<dyn ReputationStore> = Arc::new(FlakySnapshots {
        inner: Arc::clone(&store),
        remaining_failures: AtomicU32::new(10),
    });
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(128).unwrap());
    let engine = ReputationEngine::new(
        Arc::clone(&store) as Arc<dyn PaymentStore>,
        scores,
        cache,
        retrying_config(),
    );

    let err = engine.calculate_score("svc-1").await.unwrap_err();
    assert!(matches!(err, ReputationError::SnapshotExhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn recompute_job_reports_through_the_suite() {
    let store = Arc::new(MemoryStore::new());
    store.push_payment(payment("svc-good", 0x01, PaymentStatus::Succeeded, 500));
    store.push_payment(payment("svc-bad", 0x02, PaymentStatus::Succeeded, 500));

    let payments: Arc<dyn PaymentStore> = Arc::new(FlakyPayments {
        inner: Arc::clone(&store),
        poisoned: "svc-bad".to_string(),
    });
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(128).unwrap());
    let engine = Arc::new(ReputationEngine::new(
        payments,
        Arc::clone(&store) as Arc<dyn ReputationStore>,
        cache,
        ReputationConfig::default(),
    ));

    let mut suite = IndexerSuite::new();
    suite.register(Arc::new(RecomputeJob::new(engine, Duration::from_secs(60))));
    assert_eq!(suite.job_names(), vec![RECOMPUTE_JOB.to_string()]);

    let outcome = suite.run_job_once(RECOMPUTE_JOB).await.unwrap();
    match outcome {
        RunOutcome::Completed(summary) => {
            assert_eq!(summary.job, RECOMPUTE_JOB);
            assert_eq!(summary.processed, 1);
            assert_eq!(summary.skipped, 1);
            assert_eq!(summary.deduped, 0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(store.ranking_refreshes(), 1);
}

/// Payment store whose subject listing blocks until released
struct GatedPayments {
    inner: Arc<MemoryStore>,
    gate: Arc<Notify>,
}

#[async_trait]
impl PaymentStore for GatedPayments {
    async fn payments_for_subject(&self, subject_id: &str) -> StorageResult<Vec<PaymentOutcome>> {
        self.inner.payments_for_subject(subject_id).await
    }

    async fn active_subjects(&self) -> StorageResult<Vec<String>> {
        self.gate.notified().await;
        self.inner.active_subjects().await
    }
}

#[tokio::test]
async fn overlapping_recompute_ticks_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    store.push_payment(payment("svc-1", 0x01, PaymentStatus::Succeeded, 500));

    let gate = Arc::new(Notify::new());
    let payments: Arc<dyn PaymentStore> = Arc::new(GatedPayments {
        inner: Arc::clone(&store),
        gate: Arc::clone(&gate),
    });
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(128).unwrap());
    let engine = Arc::new(ReputationEngine::new(
        payments,
        Arc::clone(&store) as Arc<dyn ReputationStore>,
        cache,
        ReputationConfig::default(),
    ));
    let job = Arc::new(RecomputeJob::new(engine, Duration::from_secs(60)));

    let in_flight = Arc::clone(&job);
    let first = tokio::spawn(async move { in_flight.run_once().await });
    // Let the first run reach the gated store read.
    tokio::task::yield_now().await;

    assert!(matches!(
        job.run_once().await.unwrap(),
        RunOutcome::SkippedOverlap
    ));

    gate.notify_one();
    match first.await.unwrap().unwrap() {
        RunOutcome::Completed(summary) => {
            assert_eq!(summary.processed, 1);
            assert_eq!(summary.skipped, 0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
