//! Score math.
//!
//! Pure functions from aggregated metrics to component and composite
//! scores. Every component lands in `[0, 100]`; the composite applies the
//! component weights and then the recency multiplier.

use chrono::{DateTime, Utc};

use chainwatch_core::types::{ReputationMetrics, ReputationScore};
use chainwatch_storage::{safe_ratio, u64_to_f64_safe};

/// Algorithm revision tag written onto every snapshot
pub const CALCULATION_VERSION: u32 = 2;

/// Failure penalty multiplier in the reliability component
const FAILURE_PENALTY: f64 = 2.0;
/// Timeout penalty multiplier in the reliability component
const TIMEOUT_PENALTY: f64 = 1.5;

/// Latency tier boundaries, milliseconds
const FAST_MS: f64 = 1_000.0;
const OK_MS: f64 = 3_000.0;
const SLOW_MS: f64 = 5_000.0;

/// Payment count where the volume ramp switches from linear to log scale
const VOLUME_MIN: f64 = 10.0;
/// Payment count that saturates the volume component
const VOLUME_MAX: f64 = 10_000.0;

/// Days of inactivity for the recency weight to fall by a factor of `e`
const RECENCY_DECAY_DAYS: f64 = 30.0;
/// Recency weight floor under sustained inactivity
const RECENCY_FLOOR: f64 = 0.5;

/// Component weights in the composite
const W_RELIABILITY: f64 = 0.40;
const W_SPEED: f64 = 0.25;
const W_VOLUME: f64 = 0.20;
const W_REPEAT: f64 = 0.15;

/// Penalty-weighted reliability in `[0, 100]`.
///
/// Failures and timeouts subtract more than their raw share: a subject at
/// 95% success with a few failures scores well below 95.
#[must_use]
pub fn reliability_score(success_rate: f64, failure_ratio: f64, timeout_ratio: f64) -> f64 {
    let penalized =
        success_rate - (FAILURE_PENALTY * failure_ratio + TIMEOUT_PENALTY * timeout_ratio);
    (penalized * 100.0).max(0.0)
}

/// Piecewise latency component in `[0, 100]`
#[must_use]
pub fn speed_score(avg_latency_ms: f64) -> f64 {
    if avg_latency_ms <= FAST_MS {
        100.0
    } else if avg_latency_ms <= OK_MS {
        80.0
    } else if avg_latency_ms <= SLOW_MS {
        60.0
    } else {
        (60.0 * (-(avg_latency_ms - SLOW_MS) / SLOW_MS).exp()).max(0.0)
    }
}

/// Sub-linear volume component in `[0, 100]`.
///
/// Linear 0 to 50 below `VOLUME_MIN` payments, then 50 to 100 on a log
/// scale up to `VOLUME_MAX`.
#[must_use]
pub fn volume_score(total_payments: u64) -> f64 {
    let count = u64_to_f64_safe(total_payments);
    if count < VOLUME_MIN {
        count / VOLUME_MIN * 50.0
    } else {
        let position = (count.ln() - VOLUME_MIN.ln()) / (VOLUME_MAX.ln() - VOLUME_MIN.ln());
        (50.0 + position * 50.0).min(100.0)
    }
}

/// Inactivity decay multiplier in `[0.5, 1.0]`
#[must_use]
pub fn recency_weight(days_since_last_payment: f64) -> f64 {
    (-days_since_last_payment.max(0.0) / RECENCY_DECAY_DAYS)
        .exp()
        .clamp(RECENCY_FLOOR, 1.0)
}

/// Full snapshot from aggregated metrics, stamped at `now`
#[must_use]
pub fn score_from_metrics(
    subject_id: &str,
    metrics: &ReputationMetrics,
    now: DateTime<Utc>,
) -> ReputationScore {
    let success_rate = safe_ratio(metrics.successful_payments, metrics.total_payments);
    let failure_ratio = safe_ratio(metrics.failed_payments, metrics.total_payments);
    let timeout_ratio = safe_ratio(metrics.timeout_payments, metrics.total_payments);
    let repeat_rate = safe_ratio(metrics.repeat_customers, metrics.unique_payers);

    let reliability = reliability_score(success_rate, failure_ratio, timeout_ratio);
    let speed = speed_score(metrics.avg_latency_ms);
    let volume = volume_score(metrics.total_payments);

    let days_idle = metrics
        .last_payment_at
        .map_or(0.0, |last| days_between(last, now));
    let recency = recency_weight(days_idle);

    let composite = (W_RELIABILITY * reliability
        + W_SPEED * speed
        + W_VOLUME * volume
        + W_REPEAT * repeat_rate * 100.0)
        * recency;

    ReputationScore {
        subject_id: subject_id.to_string(),
        reputation_score: composite.clamp(0.0, 100.0),
        success_rate,
        reliability_score: reliability,
        speed_score: speed,
        volume_score: volume,
        recency_weight: recency,
        calculated_at: now,
        calculation_version: CALCULATION_VERSION,
    }
}

/// Neutral snapshot for a subject with no payment history
#[must_use]
pub fn default_score(subject_id: &str, now: DateTime<Utc>) -> ReputationScore {
    ReputationScore {
        subject_id: subject_id.to_string(),
        reputation_score: 0.0,
        success_rate: 0.0,
        reliability_score: 0.0,
        speed_score: 0.0,
        volume_score: 0.0,
        recency_weight: 1.0,
        calculated_at: now,
        calculation_version: CALCULATION_VERSION,
    }
}

fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let seconds = (later - earlier).num_seconds().max(0);
    #[allow(clippy::cast_precision_loss)]
    {
        seconds as f64 / 86_400.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ethers::types::U256;

    fn metrics(total: u64, successful: u64, failed: u64, timeouts: u64) -> ReputationMetrics {
        ReputationMetrics {
            total_payments: total,
            successful_payments: successful,
            failed_payments: failed,
            timeout_payments: timeouts,
            avg_latency_ms: 800.0,
            median_latency_ms: 750.0,
            p95_latency_ms: 1_200.0,
            unique_payers: 40,
            repeat_customers: 10,
            total_volume: U256::from(100_000_000u64),
            first_payment_at: Some(Utc::now() - Duration::days(60)),
            last_payment_at: Some(Utc::now()),
        }
    }

    #[test]
    fn reliability_penalizes_failures_harder_than_their_share() {
        // 95% success, 3% failed, 2% timed out
        let score = reliability_score(0.95, 0.03, 0.02);
        assert!((score - 86.0).abs() < 1e-9);
        // A disastrous subject bottoms out at zero, never negative
        assert!((reliability_score(0.1, 0.6, 0.3) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn speed_tiers_and_tail_decay() {
        assert!((speed_score(500.0) - 100.0).abs() < f64::EPSILON);
        assert!((speed_score(1_000.0) - 100.0).abs() < f64::EPSILON);
        assert!((speed_score(2_500.0) - 80.0).abs() < f64::EPSILON);
        assert!((speed_score(4_900.0) - 60.0).abs() < f64::EPSILON);
        let tail = speed_score(10_000.0);
        assert!(tail > 0.0 && tail < 60.0);
        assert!(speed_score(1_000_000.0) >= 0.0);
    }

    #[test]
    fn volume_ramps_linearly_then_logarithmically() {
        assert!((volume_score(0) - 0.0).abs() < f64::EPSILON);
        assert!((volume_score(5) - 25.0).abs() < f64::EPSILON);
        assert!((volume_score(10) - 50.0).abs() < f64::EPSILON);
        assert!((volume_score(10_000) - 100.0).abs() < 1e-9);
        assert!((volume_score(1_000_000) - 100.0).abs() < f64::EPSILON);
        let mid = volume_score(100);
        assert!(mid > 50.0 && mid < 100.0);
    }

    #[test]
    fn recency_decays_to_a_floor() {
        assert!((recency_weight(0.0) - 1.0).abs() < f64::EPSILON);
        let month = recency_weight(30.0);
        assert!(month < 1.0 && month > RECENCY_FLOOR);
        assert!((recency_weight(365.0) - RECENCY_FLOOR).abs() < f64::EPSILON);
        // clock skew: a payment "in the future" never boosts past 1.0
        assert!((recency_weight(-5.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn composite_sits_between_reliability_contribution_and_full_marks() {
        let now = Utc::now();
        let score = score_from_metrics("svc-1", &metrics(100, 95, 3, 2), now);
        assert!((score.reliability_score - 86.0).abs() < 1e-9);
        assert!((score.speed_score - 100.0).abs() < f64::EPSILON);
        assert!((score.recency_weight - 1.0).abs() < 1e-6);
        assert!(score.reputation_score > W_RELIABILITY * score.reliability_score);
        assert!(score.reputation_score < 100.0);
    }

    #[test]
    fn scores_stay_bounded_for_extreme_inputs() {
        let now = Utc::now();
        for (total, ok, fail, to) in [
            (1u64, 1u64, 0u64, 0u64),
            (1, 0, 1, 0),
            (1, 0, 0, 1),
            (1_000_000, 1_000_000, 0, 0),
            (100, 0, 50, 50),
        ] {
            let score = score_from_metrics("svc-x", &metrics(total, ok, fail, to), now);
            assert!(
                (0.0..=100.0).contains(&score.reputation_score),
                "composite out of bounds: {score:?}"
            );
            assert!((0.5..=1.0).contains(&score.recency_weight));
        }
    }

    proptest::proptest! {
        #[test]
        fn composite_bounded_for_arbitrary_histories(
            successful in 0u64..10_000,
            failed in 0u64..10_000,
            timeouts in 0u64..10_000,
            avg_latency in 0.0f64..1_000_000.0,
            unique_payers in 0u64..5_000,
            repeat_customers in 0u64..5_000,
            days_idle in 0i64..5_000,
        ) {
            let total = successful + failed + timeouts;
            let now = Utc::now();
            let m = ReputationMetrics {
                total_payments: total,
                successful_payments: successful,
                failed_payments: failed,
                timeout_payments: timeouts,
                avg_latency_ms: avg_latency,
                median_latency_ms: avg_latency,
                p95_latency_ms: avg_latency,
                unique_payers,
                repeat_customers: repeat_customers.min(unique_payers),
                total_volume: U256::from(total),
                first_payment_at: Some(now - Duration::days(days_idle + 1)),
                last_payment_at: Some(now - Duration::days(days_idle)),
            };
            let score = score_from_metrics("svc-p", &m, now);
            proptest::prop_assert!((0.0..=100.0).contains(&score.reputation_score));
            proptest::prop_assert!((0.5..=1.0).contains(&score.recency_weight));
            proptest::prop_assert!(score.reliability_score >= 0.0);
            proptest::prop_assert!((0.0..=100.0).contains(&score.volume_score));
        }
    }

    #[test]
    fn default_score_is_zero_with_full_recency() {
        let score = default_score("svc-new", Utc::now());
        assert!((score.reputation_score - 0.0).abs() < f64::EPSILON);
        assert!((score.recency_weight - 1.0).abs() < f64::EPSILON);
        assert_eq!(score.calculation_version, CALCULATION_VERSION);
    }
}
