//! Property-based tests for aggregation invariants.
//!
//! These tests use proptest to verify that the core invariants of the
//! aggregator hold across a wide range of random outcome streams.

use proptest::prelude::*;
use std::time::{Duration, Instant};

use stresslab::loadtest::aggregator::{percentile, requests_per_second, Aggregator};
use stresslab::loadtest::controller::RunState;
use stresslab::loadtest::outcome::{ErrorKind, Outcome};

fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        4 => (100u16..600, 0u64..5_000).prop_map(|(status, micros)| {
            Outcome::response(0, status, Duration::from_micros(micros * 100), 400)
        }),
        1 => (0usize..3, 0u64..5_000).prop_map(|(kind, micros)| {
            let kind = [
                ErrorKind::Timeout,
                ErrorKind::ConnectionError,
                ErrorKind::ProtocolError,
            ][kind];
            Outcome::transport_failure(0, kind, Duration::from_micros(micros * 100))
        }),
    ]
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

proptest! {
    /// P50 <= P90 <= P95 <= P99 always, in snapshots and summaries.
    #[test]
    fn percentiles_monotonic(
        latencies in prop::collection::vec(0u64..100_000, 1..300),
    ) {
        let aggregator = Aggregator::new(latencies.len() as u32);
        for (i, micros) in latencies.iter().enumerate() {
            aggregator
                .record(&Outcome::response(i as u32, 200, Duration::from_micros(*micros), 400))
                .unwrap();
        }
        let snap = aggregator.snapshot();
        prop_assert!(snap.p50 <= snap.p90, "p50 ({}) > p90 ({})", snap.p50, snap.p90);
        prop_assert!(snap.p90 <= snap.p95, "p90 ({}) > p95 ({})", snap.p90, snap.p95);
        prop_assert!(snap.p95 <= snap.p99, "p95 ({}) > p99 ({})", snap.p95, snap.p99);

        let latency = aggregator.finalize(RunState::Completed).unwrap().latency;
        prop_assert!(latency.min <= latency.p50);
        prop_assert!(latency.p99 <= latency.max);
        prop_assert!(latency.min - 1e-9 <= latency.avg && latency.avg <= latency.max + 1e-9);
    }

    /// success + failure == completed, and the status distribution sums to it.
    #[test]
    fn counts_are_conserved(
        outcomes in prop::collection::vec(outcome_strategy(), 0..300),
    ) {
        let aggregator = Aggregator::new(outcomes.len() as u32);
        for o in &outcomes {
            aggregator.record(o).unwrap();
        }
        let summary = aggregator.finalize(RunState::Completed).unwrap();
        let n = outcomes.len() as u64;

        prop_assert_eq!(summary.completed, n);
        prop_assert_eq!(summary.success + summary.failure, n);
        prop_assert_eq!(summary.status_codes.values().sum::<u64>(), n);

        let expected_success = outcomes.iter().filter(|o| o.is_success).count() as u64;
        prop_assert_eq!(summary.success, expected_success);
        let expected_transport = outcomes.iter().filter(|o| o.status_code.is_none()).count() as u64;
        prop_assert_eq!(summary.transport_errors, expected_transport);
    }

    /// The same multiset of outcomes in any order yields an identical summary.
    #[test]
    fn summary_is_order_independent(
        (original, shuffled) in prop::collection::vec(outcome_strategy(), 0..200)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
    ) {
        let t0 = Instant::now();
        let end = t0 + Duration::from_millis(1_500);

        let a = Aggregator::with_start(original.len() as u32, t0);
        for o in &original {
            a.record(o).unwrap();
        }
        let b = Aggregator::with_start(shuffled.len() as u32, t0);
        for o in &shuffled {
            b.record(o).unwrap();
        }

        let left = a.finalize_at(RunState::Completed, end).unwrap();
        let right = b.finalize_at(RunState::Completed, end).unwrap();
        prop_assert_eq!(left, right);
    }

    /// The percentile helper agrees with integer nearest-rank arithmetic.
    #[test]
    fn percentile_matches_nearest_rank(
        values in prop::collection::vec(0u32..10_000, 1..1_000),
        p in 1u32..=100,
    ) {
        let values: Vec<f64> = values.into_iter().map(f64::from).collect();
        let sorted = sorted(&values);
        let n = sorted.len() as u32;
        let rank = (p * n).div_ceil(100).max(1);
        let expected = sorted[(rank - 1) as usize];
        prop_assert_eq!(percentile(&sorted, f64::from(p)), expected);
    }

    /// Any percentile is an element of the sample and grows with p.
    #[test]
    fn percentile_is_a_sample_and_monotone_in_p(
        values in prop::collection::vec(0.0f64..1e6, 1..200),
        p in 0.0f64..=100.0,
        q in 0.0f64..=100.0,
    ) {
        let sorted = sorted(&values);
        let (lo, hi) = if p <= q { (p, q) } else { (q, p) };
        let at_lo = percentile(&sorted, lo);
        let at_hi = percentile(&sorted, hi);
        prop_assert!(sorted.contains(&at_lo));
        prop_assert!(at_lo <= at_hi);
    }

    /// Throughput is never negative and never divides by zero.
    #[test]
    fn rps_is_finite(completed in 0u64..2_000, elapsed in 0.0f64..100.0) {
        let rps = requests_per_second(completed, elapsed);
        prop_assert!(rps.is_finite());
        prop_assert!(rps >= 0.0);
        if completed == 0 {
            prop_assert_eq!(rps, 0.0);
        }
    }
}

#[test]
fn snapshots_are_monotonic_under_concurrent_writes() {
    let aggregator = Aggregator::new(1_000);
    let mut taken = Vec::new();
    std::thread::scope(|scope| {
        for t in 0..4u32 {
            let aggregator = &aggregator;
            scope.spawn(move || {
                for i in 0..250u32 {
                    aggregator
                        .record(&Outcome::response(
                            t * 250 + i,
                            200,
                            Duration::from_micros(u64::from(i)),
                            400,
                        ))
                        .unwrap();
                }
            });
        }
        for _ in 0..50 {
            taken.push(aggregator.tick());
        }
    });

    for pair in taken.windows(2) {
        assert!(pair[0].completed <= pair[1].completed);
        assert!(pair[0].elapsed <= pair[1].elapsed);
    }
    assert_eq!(aggregator.snapshot().completed, 1_000);
}
