//! Reputation engine: cache-aside scoring over payment outcomes.
//!
//! `calculate_score` is the single entry point for readers; the snapshot
//! store and the cache are both write-behind conveniences, the payment
//! outcome rows are the source of truth. A subject with no history gets
//! the default zero score which is neither persisted nor cached, so the
//! first real payment is scored immediately.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use chainwatch_chain::retry::RetryPolicy;
use chainwatch_core::config::ReputationConfig;
use chainwatch_core::types::ReputationScore;
use chainwatch_storage::stores::{PaymentStore, ReputationStore};
use chainwatch_storage::Cache;

use crate::error::{ReputationError, ReputationResult};
use crate::metrics::aggregate;
use crate::score::{default_score, score_from_metrics};

/// Counters for one bulk recompute pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecomputeSummary {
    /// Subjects scored and persisted
    pub scored: u64,

    /// Subjects that failed and were skipped
    pub failed: u64,
}

/// Weighted, time-decayed reputation scoring engine
pub struct ReputationEngine {
    payments: Arc<dyn PaymentStore>,
    scores: Arc<dyn ReputationStore>,
    cache: Arc<dyn Cache>,
    config: ReputationConfig,
    snapshot_retry: RetryPolicy,
}

impl ReputationEngine {
    /// Assemble an engine over its stores and cache
    #[must_use]
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        scores: Arc<dyn ReputationStore>,
        cache: Arc<dyn Cache>,
        config: ReputationConfig,
    ) -> Self {
        let snapshot_retry = RetryPolicy::fixed(
            config.snapshot_retry_attempts.max(1),
            config.snapshot_retry_delay,
        );
        Self {
            payments,
            scores,
            cache,
            config,
            snapshot_retry,
        }
    }

    /// Score one subject, serving from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns error when the payment rows cannot be read or the snapshot
    /// cannot be persisted within the retry budget.
    pub async fn calculate_score(&self, subject_id: &str) -> ReputationResult<ReputationScore> {
        let key = cache_key(subject_id);
        if let Some(cached) = self.cached_score(&key).await {
            debug!(subject_id, "reputation cache hit");
            return Ok(cached);
        }

        let payments = self.payments.payments_for_subject(subject_id).await?;
        if payments.is_empty() {
            debug!(subject_id, "no payment history, returning default score");
            return Ok(default_score(subject_id, Utc::now()));
        }

        let metrics = aggregate(&payments);
        let score = score_from_metrics(subject_id, &metrics, Utc::now());
        debug!(
            subject_id,
            score = score.reputation_score,
            payments = metrics.total_payments,
            "reputation computed"
        );

        self.persist_snapshot(&score).await?;
        self.cache_score(&key, &score).await;
        Ok(score)
    }

    /// Drop the cached score so the next read recomputes
    pub async fn invalidate(&self, subject_id: &str) {
        if let Err(err) = self.cache.delete(&cache_key(subject_id)).await {
            warn!(subject_id, error = %err, "failed to invalidate cached score");
        }
    }

    /// Recompute every subject with payment history.
    ///
    /// Per-subject failures are logged and skipped; the ranking
    /// materialization is refreshed once at the end either way.
    ///
    /// # Errors
    ///
    /// Returns error when the subject list cannot be read or the ranking
    /// refresh fails.
    pub async fn recompute_all(&self) -> ReputationResult<RecomputeSummary> {
        let subjects = self.payments.active_subjects().await?;
        let mut summary = RecomputeSummary::default();

        for subject_id in &subjects {
            self.invalidate(subject_id).await;
            match self.calculate_score(subject_id).await {
                Ok(_) => summary.scored += 1,
                Err(err) => {
                    warn!(subject_id, error = %err, "skipping subject in bulk recompute");
                    summary.failed += 1;
                }
            }
        }

        self.scores.refresh_rankings().await?;
        info!(
            scored = summary.scored,
            failed = summary.failed,
            "bulk reputation recompute finished"
        );
        Ok(summary)
    }

    /// Last persisted snapshot for a subject, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns error when the snapshot store read fails.
    pub async fn stored_score(&self, subject_id: &str) -> ReputationResult<Option<ReputationScore>> {
        Ok(self.scores.get_score(subject_id).await?)
    }

    async fn persist_snapshot(&self, score: &ReputationScore) -> ReputationResult<()> {
        self.snapshot_retry
            .run(
                "persist_score_snapshot",
                |err: &chainwatch_storage::StorageError| err.is_retryable(),
                || self.scores.upsert_score(score),
            )
            .await
            .map_err(|err| ReputationError::SnapshotExhausted {
                subject_id: score.subject_id.clone(),
                attempts: self.snapshot_retry.max_attempts,
                reason: err.to_string(),
            })
    }

    async fn cached_score(&self, key: &str) -> Option<ReputationScore> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).ok(),
            Ok(None) => None,
            Err(err) => {
                // Cache trouble degrades to a recompute, never a failure.
                warn!(key, error = %err, "reputation cache read failed");
                None
            }
        }
    }

    async fn cache_score(&self, key: &str, score: &ReputationScore) {
        let Ok(bytes) = serde_json::to_vec(score) else {
            return;
        };
        if let Err(err) = self
            .cache
            .set(key, &bytes, Some(self.config.cache_ttl))
            .await
        {
            warn!(key, error = %err, "reputation cache write failed");
        }
    }
}

fn cache_key(subject_id: &str) -> String {
    format!("reputation:{subject_id}")
}
