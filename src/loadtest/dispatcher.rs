//! Bounded-concurrency request dispatcher.
//!
//! A fixed pool of worker tasks shares one atomic claim counter. Each
//! worker checks for cancellation, claims the next request index, issues
//! the request through a [`Target`], and hands the resulting [`Outcome`]
//! to the caller's callback. Failures of individual requests become
//! outcomes; only a bad budget or concurrency stops the dispatcher from
//! starting.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::loadtest::error::LoadTestError;
use crate::loadtest::outcome::Outcome;
use crate::loadtest::target::Target;

/// Atomic gauge of requests currently in flight, with a high-water mark.
///
/// Lightweight wrapper around two `Arc<AtomicU32>` for clone-friendly
/// sharing across worker tasks and observers.
#[derive(Clone, Debug, Default)]
pub struct InFlightCounter {
    current: Arc<AtomicU32>,
    peak: Arc<AtomicU32>,
}

impl InFlightCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one request as started and updates the peak.
    pub fn increment(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    /// Marks one request as finished.
    pub fn decrement(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Returns the number of requests in flight right now.
    pub fn get(&self) -> u32 {
        self.current.load(Ordering::SeqCst)
    }

    /// Returns the highest in-flight count observed so far.
    pub fn peak(&self) -> u32 {
        self.peak.load(Ordering::SeqCst)
    }
}

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// Every index in the budget was claimed and its outcome delivered.
    Completed,
    /// Cancellation stopped workers before the budget was exhausted.
    Cancelled,
}

/// Issues exactly `total_requests` requests with at most `concurrency`
/// in flight.
pub struct Dispatcher {
    target: Arc<dyn Target>,
    total_requests: u32,
    concurrency: u32,
    success_status_ceiling: u16,
    cancel: CancellationToken,
    in_flight: InFlightCounter,
}

impl Dispatcher {
    /// Builds a dispatcher.
    ///
    /// Returns [`LoadTestError::ConfigValidation`] when `concurrency` is 0;
    /// no request is attempted in that case.
    pub fn new(
        target: Arc<dyn Target>,
        total_requests: u32,
        concurrency: u32,
        success_status_ceiling: u16,
        cancel: CancellationToken,
    ) -> Result<Self, LoadTestError> {
        if concurrency == 0 {
            return Err(LoadTestError::validation("concurrency must be at least 1"));
        }
        Ok(Self {
            target,
            total_requests,
            concurrency,
            success_status_ceiling,
            cancel,
            in_flight: InFlightCounter::new(),
        })
    }

    /// Returns a handle to the live in-flight gauge.
    pub fn in_flight(&self) -> InFlightCounter {
        self.in_flight.clone()
    }

    /// Runs the budget to exhaustion or cancellation.
    ///
    /// `on_outcome` is invoked once per finished request, concurrently from
    /// any worker. Requests already in flight when cancellation fires are
    /// allowed to finish and their outcomes are delivered before this
    /// returns.
    pub async fn run<F>(&self, on_outcome: F) -> DispatchStatus
    where
        F: Fn(Outcome) + Send + Sync + 'static,
    {
        if self.total_requests == 0 {
            return DispatchStatus::Completed;
        }

        let workers = self.concurrency.min(self.total_requests);
        let next_index = Arc::new(AtomicU32::new(0));
        let on_outcome = Arc::new(on_outcome);
        let tracker = TaskTracker::new();

        for worker_id in 0..workers {
            tracker.spawn(worker_loop(
                worker_id,
                self.target.clone(),
                next_index.clone(),
                self.total_requests,
                self.success_status_ceiling,
                self.cancel.clone(),
                self.in_flight.clone(),
                on_outcome.clone(),
            ));
        }

        tracker.close();
        tracker.wait().await;

        let claimed = next_index.load(Ordering::SeqCst).min(self.total_requests);
        if claimed < self.total_requests {
            DispatchStatus::Cancelled
        } else {
            DispatchStatus::Completed
        }
    }
}

/// Worker task loop: claim, send, measure, deliver.
#[allow(clippy::too_many_arguments)]
async fn worker_loop<F>(
    worker_id: u32,
    target: Arc<dyn Target>,
    next_index: Arc<AtomicU32>,
    total_requests: u32,
    success_status_ceiling: u16,
    cancel: CancellationToken,
    in_flight: InFlightCounter,
    on_outcome: Arc<F>,
) where
    F: Fn(Outcome) + Send + Sync + 'static,
{
    loop {
        // Pre-claim cancellation check
        if cancel.is_cancelled() {
            tracing::debug!(worker_id, "worker stopping: cancelled");
            return;
        }

        let index = next_index.fetch_add(1, Ordering::SeqCst);
        if index >= total_requests {
            return;
        }

        in_flight.increment();
        let start = Instant::now();
        let result = target.send().await;
        let latency = start.elapsed();
        in_flight.decrement();

        let outcome = match result {
            Ok(status) => Outcome::response(index, status, latency, success_status_ceiling),
            Err(err) => {
                tracing::debug!(worker_id, index, error = %err, "transport failure");
                Outcome::transport_failure(index, err.kind(), latency)
            },
        };
        tracing::debug!(
            worker_id,
            index,
            status = ?outcome.status_code,
            latency_ms = outcome.latency_ms,
            success = outcome.is_success,
            "request finished"
        );
        on_outcome(outcome);
    }
}
