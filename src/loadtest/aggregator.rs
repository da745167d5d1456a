//! Online aggregation of request outcomes into snapshots and a summary.
//!
//! [`Aggregator`] is the only shared mutable state of a run. Workers call
//! [`Aggregator::record`] concurrently; the controller's timer calls
//! [`Aggregator::tick`]; the controller calls [`Aggregator::finalize`]
//! exactly once at the end.
//!
//! # Design
//!
//! - **One lock**: every read and write goes through a single
//!   `parking_lot::Mutex`, so a snapshot never observes a half-applied
//!   outcome. Queries copy the state under the lock and sort outside it,
//!   so writers are never blocked behind a sort.
//! - **Exact percentiles**: all latencies are retained and sorted on each
//!   query; percentile `p` is the nearest-rank value at index
//!   `ceil(p/100 * n) - 1`. Budgets are capped at
//!   [`MAX_TOTAL_REQUESTS`](crate::loadtest::config::MAX_TOTAL_REQUESTS), so
//!   the sort stays cheap.
//! - **Order independence**: mean, min and max are computed from the sorted
//!   sequence, so the summary does not depend on completion order.

use std::collections::BTreeMap;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::loadtest::config::MAX_TOTAL_REQUESTS;
use crate::loadtest::controller::RunState;
use crate::loadtest::error::AggregatorError;
use crate::loadtest::outcome::Outcome;

/// Point-in-time progress view of an active run.
///
/// This is the record forwarded to progress sinks on every tick.
/// Latencies are in milliseconds, `elapsed` in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Outcomes recorded so far.
    pub completed: u64,
    /// Request budget of the run.
    pub total: u64,
    /// Throughput so far (requests per second).
    pub rps: f64,
    /// Successful outcomes so far.
    pub success: u64,
    /// Failed outcomes so far (HTTP failures and transport failures).
    pub failure: u64,
    /// Nearest-rank P50 latency.
    pub p50: f64,
    /// Nearest-rank P90 latency.
    pub p90: f64,
    /// Nearest-rank P95 latency.
    pub p95: f64,
    /// Nearest-rank P99 latency.
    pub p99: f64,
    /// Mean latency.
    pub avg_latency_ms: f64,
    /// Seconds since dispatch started.
    pub elapsed: f64,
}

/// Latency distribution summary in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LatencyStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencyStats {
    /// Computes all stats from an ascending sequence. Empty input yields zeros.
    pub fn from_sorted(sorted: &[f64]) -> Self {
        if sorted.is_empty() {
            return Self::default();
        }
        let sum: f64 = sorted.iter().sum();
        Self {
            avg: sum / sorted.len() as f64,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p50: percentile(sorted, 50.0),
            p90: percentile(sorted, 90.0),
            p95: percentile(sorted, 95.0),
            p99: percentile(sorted, 99.0),
        }
    }
}

/// Terminal aggregate of a run. Produced exactly once and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Terminal state the run reached.
    pub state: RunState,
    /// Outcomes recorded.
    pub completed: u64,
    /// Request budget of the run.
    pub total: u64,
    /// Successful outcomes.
    pub success: u64,
    /// Failed outcomes (HTTP failures and transport failures).
    pub failure: u64,
    /// Outcomes with no HTTP status (timeouts, connection and protocol errors).
    pub transport_errors: u64,
    /// Overall throughput (requests per second).
    pub rps: f64,
    /// Seconds from dispatch start to finalization.
    pub elapsed: f64,
    /// Latency distribution over every recorded outcome.
    pub latency: LatencyStats,
    /// Count per status code (`"200"`) or transport error kind (`"timeout"`).
    pub status_codes: BTreeMap<String, u64>,
    /// Snapshots emitted while the run was active, in emission order.
    pub timeseries: Vec<Snapshot>,
}

impl Summary {
    /// Fraction of recorded outcomes that failed (0.0..=1.0).
    pub fn error_rate(&self) -> f64 {
        if self.completed == 0 {
            return 0.0;
        }
        self.failure as f64 / self.completed as f64
    }
}

/// Nearest-rank percentile of an ascending sequence.
///
/// Returns the element at index `ceil(p/100 * n) - 1`, clamped to
/// `[0, n-1]`. Returns 0.0 for an empty sequence.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (p * n as f64 / 100.0).ceil();
    let idx = if rank <= 1.0 {
        0
    } else {
        (rank as usize - 1).min(n - 1)
    };
    sorted[idx]
}

/// Requests per second for `completed` outcomes over `elapsed_secs`.
///
/// When the elapsed time rounds to zero at millisecond resolution the
/// count itself is reported, as if one second had passed.
pub fn requests_per_second(completed: u64, elapsed_secs: f64) -> f64 {
    if completed == 0 {
        return 0.0;
    }
    if (elapsed_secs * 1000.0).round() == 0.0 {
        return completed as f64;
    }
    completed as f64 / elapsed_secs
}

#[derive(Default)]
struct AggregateState {
    completed: u64,
    success: u64,
    failure: u64,
    transport_errors: u64,
    status_counts: BTreeMap<String, u64>,
    latencies: Vec<f64>,
    timeseries: Vec<Snapshot>,
    finalized: bool,
}

/// Thread-safe accumulator for one run's outcomes.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stresslab::loadtest::aggregator::Aggregator;
/// use stresslab::loadtest::outcome::Outcome;
///
/// let aggregator = Aggregator::new(1);
/// aggregator
///     .record(&Outcome::response(0, 200, Duration::from_millis(42), 400))
///     .unwrap();
///
/// let snap = aggregator.snapshot();
/// assert_eq!(snap.completed, 1);
/// assert_eq!(snap.p50, 42.0);
/// ```
pub struct Aggregator {
    total: u64,
    started_at: Instant,
    state: Mutex<AggregateState>,
}

impl Aggregator {
    /// Creates an aggregator whose clock starts now.
    pub fn new(total_requests: u32) -> Self {
        Self::with_start(total_requests, Instant::now())
    }

    /// Creates an aggregator with an explicit start instant.
    pub fn with_start(total_requests: u32, started_at: Instant) -> Self {
        let state = AggregateState {
            latencies: Vec::with_capacity(total_requests.min(MAX_TOTAL_REQUESTS) as usize),
            ..AggregateState::default()
        };
        Self {
            total: u64::from(total_requests),
            started_at,
            state: Mutex::new(state),
        }
    }

    /// Records one outcome.
    ///
    /// Fails with [`AggregatorError::Finalized`] once the summary has been
    /// produced; the outcome is dropped in that case.
    pub fn record(&self, outcome: &Outcome) -> Result<(), AggregatorError> {
        let mut state = self.state.lock();
        if state.finalized {
            return Err(AggregatorError::Finalized);
        }

        state.completed += 1;
        if outcome.is_success {
            state.success += 1;
        } else {
            state.failure += 1;
        }
        if outcome.error_kind.is_some() {
            state.transport_errors += 1;
        }
        *state.status_counts.entry(outcome.status_bucket()).or_insert(0) += 1;
        state.latencies.push(outcome.latency_ms);
        Ok(())
    }

    /// Number of outcomes recorded so far.
    pub fn completed(&self) -> u64 {
        self.state.lock().completed
    }

    /// Consistent snapshot as of now.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_at(Instant::now())
    }

    /// Consistent snapshot with elapsed time measured up to `now`.
    pub fn snapshot_at(&self, now: Instant) -> Snapshot {
        let captured = Captured::from(&*self.state.lock());
        self.build_snapshot(captured, now)
    }

    /// Takes a snapshot and appends it to the run's timeseries.
    ///
    /// Only the controller's timer ticks, so timeseries entries land in
    /// emission order. Ticks after finalization are not retained.
    pub fn tick(&self) -> Snapshot {
        let snapshot = self.snapshot();
        let mut state = self.state.lock();
        if !state.finalized {
            state.timeseries.push(snapshot.clone());
        }
        snapshot
    }

    /// Produces the terminal summary and closes the aggregator to writes.
    pub fn finalize(&self, final_state: RunState) -> Result<Summary, AggregatorError> {
        self.finalize_at(final_state, Instant::now())
    }

    /// [`finalize`](Self::finalize) with elapsed time measured up to `now`.
    pub fn finalize_at(
        &self,
        final_state: RunState,
        now: Instant,
    ) -> Result<Summary, AggregatorError> {
        let mut state = self.state.lock();
        if state.finalized {
            return Err(AggregatorError::Finalized);
        }
        state.finalized = true;
        let completed = state.completed;
        let success = state.success;
        let failure = state.failure;
        let transport_errors = state.transport_errors;
        let status_codes = state.status_counts.clone();
        let mut latencies = state.latencies.clone();
        let timeseries = std::mem::take(&mut state.timeseries);
        drop(state);

        latencies.sort_by(|a, b| a.total_cmp(b));
        let elapsed = self.elapsed_secs(now);
        Ok(Summary {
            state: final_state,
            completed,
            total: self.total,
            success,
            failure,
            transport_errors,
            rps: requests_per_second(completed, elapsed),
            elapsed,
            latency: LatencyStats::from_sorted(&latencies),
            status_codes,
            timeseries,
        })
    }

    fn build_snapshot(&self, captured: Captured, now: Instant) -> Snapshot {
        let elapsed = self.elapsed_secs(now);
        let mut latencies = captured.latencies;
        latencies.sort_by(|a, b| a.total_cmp(b));
        let stats = LatencyStats::from_sorted(&latencies);
        Snapshot {
            completed: captured.completed,
            total: self.total,
            rps: requests_per_second(captured.completed, elapsed),
            success: captured.success,
            failure: captured.failure,
            p50: stats.p50,
            p90: stats.p90,
            p95: stats.p95,
            p99: stats.p99,
            avg_latency_ms: stats.avg,
            elapsed,
        }
    }

    fn elapsed_secs(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.started_at).as_secs_f64()
    }
}

/// Copy of the fields a snapshot needs, taken under the lock.
struct Captured {
    completed: u64,
    success: u64,
    failure: u64,
    latencies: Vec<f64>,
}

impl From<&AggregateState> for Captured {
    fn from(state: &AggregateState) -> Self {
        Self {
            completed: state.completed,
            success: state.success,
            failure: state.failure,
            latencies: state.latencies.clone(),
        }
    }
}
