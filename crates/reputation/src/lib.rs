//! Weighted, time-decayed reputation scoring for Chainwatch.
//!
//! Scores are derived from payment outcome rows written by the settlement
//! layer. The composite blends four components:
//!
//! - reliability (40%): success rate with failures and timeouts penalized
//!   beyond their raw share
//! - speed (25%): piecewise latency tiers with an exponential tail
//! - volume (20%): sub-linear payment-count ramp
//! - repeat business (15%): share of payers who came back
//!
//! then multiplies by a recency weight that decays toward a 0.5 floor
//! under inactivity. Snapshots are upserted per subject and cached with a
//! short TTL; the outcome rows stay the source of truth.

pub mod engine;
pub mod error;
pub mod job;
pub mod metrics;
pub mod score;

pub use engine::{RecomputeSummary, ReputationEngine};
pub use error::{ReputationError, ReputationResult};
pub use job::{RecomputeJob, RECOMPUTE_JOB};
pub use metrics::aggregate;
pub use score::{
    default_score, recency_weight, reliability_score, score_from_metrics, speed_score,
    volume_score, CALCULATION_VERSION,
};
