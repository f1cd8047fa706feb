//! Payment outcome aggregation.
//!
//! Metrics are derived per scoring run from the raw outcome rows, never
//! persisted on their own.

use std::collections::HashMap;

use ethers::types::{Address, U256};

use chainwatch_core::types::{PaymentOutcome, PaymentStatus, ReputationMetrics};
use chainwatch_storage::u64_to_f64_safe;

/// Aggregate one subject's payment outcomes into scoring inputs.
///
/// Callers pass the rows ordered by occurrence time; the first/last
/// timestamps are taken positionally.
#[must_use]
pub fn aggregate(payments: &[PaymentOutcome]) -> ReputationMetrics {
    let mut successful = 0u64;
    let mut failed = 0u64;
    let mut timeouts = 0u64;
    let mut total_volume = U256::zero();
    let mut per_payer: HashMap<Address, u64> = HashMap::new();
    let mut latencies: Vec<u64> = Vec::with_capacity(payments.len());

    for payment in payments {
        match payment.status {
            PaymentStatus::Succeeded => successful += 1,
            PaymentStatus::Failed => failed += 1,
            PaymentStatus::TimedOut => timeouts += 1,
        }
        total_volume = total_volume.saturating_add(payment.amount);
        *per_payer.entry(payment.payer).or_insert(0) += 1;
        latencies.push(payment.latency_ms);
    }

    latencies.sort_unstable();
    let total = payments.len() as u64;
    let repeat_customers = per_payer.values().filter(|&&count| count > 1).count() as u64;

    ReputationMetrics {
        total_payments: total,
        successful_payments: successful,
        failed_payments: failed,
        timeout_payments: timeouts,
        avg_latency_ms: mean(&latencies),
        median_latency_ms: percentile(&latencies, 50.0),
        p95_latency_ms: percentile(&latencies, 95.0),
        unique_payers: per_payer.len() as u64,
        repeat_customers,
        total_volume,
        first_payment_at: payments.first().map(|p| p.occurred_at),
        last_payment_at: payments.last().map(|p| p.occurred_at),
    }
}

fn mean(sorted: &[u64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let sum: u64 = sorted.iter().sum();
    u64_to_f64_safe(sum) / u64_to_f64_safe(sorted.len() as u64)
}

/// Nearest-rank percentile over a sorted sample
fn percentile(sorted: &[u64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * u64_to_f64_safe(sorted.len() as u64)).ceil();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = (rank as usize).clamp(1, sorted.len()) - 1;
    u64_to_f64_safe(sorted[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn payment(
        payer: u8,
        status: PaymentStatus,
        latency_ms: u64,
        occurred_secs: i64,
    ) -> PaymentOutcome {
        PaymentOutcome {
            subject_id: "svc-1".to_string(),
            status,
            latency_ms,
            payer: Address::repeat_byte(payer),
            amount: U256::from(1_000_000u64),
            occurred_at: Utc.timestamp_opt(occurred_secs, 0).unwrap(),
        }
    }

    #[test]
    fn empty_input_yields_zeroed_metrics() {
        let metrics = aggregate(&[]);
        assert_eq!(metrics.total_payments, 0);
        assert_eq!(metrics.unique_payers, 0);
        assert!(metrics.first_payment_at.is_none());
        assert!((metrics.avg_latency_ms - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn counts_statuses_and_payers() {
        let payments = vec![
            payment(0x01, PaymentStatus::Succeeded, 500, 100),
            payment(0x01, PaymentStatus::Succeeded, 700, 200),
            payment(0x02, PaymentStatus::Failed, 900, 300),
            payment(0x03, PaymentStatus::TimedOut, 30_000, 400),
        ];
        let metrics = aggregate(&payments);
        assert_eq!(metrics.total_payments, 4);
        assert_eq!(metrics.successful_payments, 2);
        assert_eq!(metrics.failed_payments, 1);
        assert_eq!(metrics.timeout_payments, 1);
        assert_eq!(metrics.unique_payers, 3);
        assert_eq!(metrics.repeat_customers, 1);
        assert_eq!(metrics.total_volume, U256::from(4_000_000u64));
        assert_eq!(
            metrics.first_payment_at,
            Some(Utc.timestamp_opt(100, 0).unwrap())
        );
        assert_eq!(
            metrics.last_payment_at,
            Some(Utc.timestamp_opt(400, 0).unwrap())
        );
    }

    #[test]
    fn latency_distribution_over_sorted_sample() {
        let payments: Vec<_> = (1..=100u64)
            .map(|i| payment(0x01, PaymentStatus::Succeeded, i * 10, i as i64))
            .collect();
        let metrics = aggregate(&payments);
        assert!((metrics.avg_latency_ms - 505.0).abs() < f64::EPSILON);
        assert!((metrics.median_latency_ms - 500.0).abs() < f64::EPSILON);
        assert!((metrics.p95_latency_ms - 950.0).abs() < f64::EPSILON);
    }
}
