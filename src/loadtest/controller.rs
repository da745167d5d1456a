//! Run lifecycle orchestration.
//!
//! [`Controller`] owns one run from `pending` to a terminal state:
//! - Validates the [`RunConfig`] before anything is dispatched
//! - Drives the [`Dispatcher`] and feeds every outcome into the [`Aggregator`]
//! - Ticks the aggregator on a fixed cadence and forwards snapshots to the
//!   [`ProgressSink`]
//! - Observes the [`CancellationToken`] and drains in-flight requests
//! - Finalizes exactly once and persists the [`RunRecord`]
//!
//! State transitions are published through a `watch` channel.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::loadtest::aggregator::{Aggregator, Summary};
use crate::loadtest::config::RunConfig;
use crate::loadtest::dispatcher::{DispatchStatus, Dispatcher};
use crate::loadtest::error::LoadTestError;
use crate::loadtest::sink::ProgressSink;
use crate::loadtest::store::{RunRecord, SummaryStore};
use crate::loadtest::target::{HttpTarget, Target};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for `completed`, `failed` and `cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a run that got past validation.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The record handed to the store.
    pub record: RunRecord,
    /// Highest number of simultaneous in-flight requests observed.
    pub peak_in_flight: u32,
    /// Whether the store accepted the record.
    pub persisted: bool,
}

impl RunReport {
    /// Terminal state of the run.
    pub fn state(&self) -> RunState {
        self.record.state
    }

    /// Final aggregate of the run.
    pub fn summary(&self) -> &Summary {
        &self.record.summary
    }
}

/// Orchestrates a single load test run.
///
/// A controller is single-use: a second call to [`run`](Self::run) is
/// rejected.
pub struct Controller {
    run_id: String,
    config: RunConfig,
    cancel: CancellationToken,
    state_tx: watch::Sender<RunState>,
}

impl Controller {
    /// Creates a controller in the `pending` state.
    pub fn new(run_id: impl Into<String>, config: RunConfig) -> Self {
        let (state_tx, _) = watch::channel(RunState::Pending);
        Self {
            run_id: run_id.into(),
            config,
            cancel: CancellationToken::new(),
            state_tx,
        }
    }

    /// Caller-assigned run id.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The run's configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Token that cancels this run when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        *self.state_tx.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    /// Runs against the configured URL with a reqwest-backed target.
    pub async fn run(
        &self,
        sink: &dyn ProgressSink,
        store: &dyn SummaryStore,
    ) -> Result<RunReport, LoadTestError> {
        let target = Arc::new(HttpTarget::from_config(&self.config));
        self.run_against(target, sink, store).await
    }

    /// Runs against an arbitrary [`Target`].
    ///
    /// Returns `Err` only for configuration errors, after a `failed` record
    /// has been persisted. Completed and cancelled runs return `Ok`, with
    /// per-request failures counted in the summary.
    pub async fn run_against(
        &self,
        target: Arc<dyn Target>,
        sink: &dyn ProgressSink,
        store: &dyn SummaryStore,
    ) -> Result<RunReport, LoadTestError> {
        if self.state() != RunState::Pending {
            return Err(LoadTestError::validation(format!(
                "run '{}' was already started",
                self.run_id
            )));
        }
        let created_at = Utc::now();

        if let Err(err) = self.config.validate() {
            return self.fail(err, created_at, sink, store).await;
        }
        let settings = &self.config.settings;
        let dispatcher = match Dispatcher::new(
            target,
            self.config.total_requests,
            self.config.concurrency,
            settings.success_status_ceiling,
            self.cancel.clone(),
        ) {
            Ok(dispatcher) => dispatcher,
            Err(err) => return self.fail(err, created_at, sink, store).await,
        };

        tracing::info!(
            run_id = %self.run_id,
            url = %self.config.url,
            method = %self.config.method,
            total_requests = self.config.total_requests,
            concurrency = self.config.concurrency,
            "run started"
        );

        let aggregator = Arc::new(Aggregator::new(self.config.total_requests));
        self.state_tx.send_replace(RunState::Running);

        let recorder = aggregator.clone();
        let run_id = self.run_id.clone();
        let dispatch = dispatcher.run(move |outcome| {
            if let Err(err) = recorder.record(&outcome) {
                tracing::warn!(
                    run_id = %run_id,
                    index = outcome.sequence_index,
                    error = %err,
                    "outcome dropped"
                );
            }
        });
        tokio::pin!(dispatch);

        let period = settings.snapshot_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let status = loop {
            tokio::select! {
                biased;

                status = &mut dispatch => break status,
                _ = self.cancel.cancelled() => {
                    tracing::info!(run_id = %self.run_id, "cancellation requested, draining in-flight requests");
                    break (&mut dispatch).await;
                }
                _ = ticker.tick() => {
                    let snapshot = aggregator.tick();
                    if let Err(err) = sink.publish(&self.run_id, &snapshot).await {
                        tracing::warn!(run_id = %self.run_id, error = %err, "progress sink rejected snapshot");
                    }
                }
            }
        };

        let final_state = match status {
            DispatchStatus::Completed => RunState::Completed,
            DispatchStatus::Cancelled => RunState::Cancelled,
        };
        let summary = aggregator.finalize(final_state)?;
        let peak_in_flight = dispatcher.in_flight().peak();

        if let Err(err) = sink.finish(&self.run_id, &summary).await {
            tracing::warn!(run_id = %self.run_id, error = %err, "progress sink rejected summary");
        }

        let record = RunRecord::new(self.run_id.clone(), &self.config, created_at, summary);
        let persisted = self.persist(store, &record);
        self.state_tx.send_replace(final_state);

        tracing::info!(
            run_id = %self.run_id,
            state = %final_state,
            completed = record.summary.completed,
            success = record.summary.success,
            failure = record.summary.failure,
            rps = record.summary.rps,
            peak_in_flight,
            "run finished"
        );

        Ok(RunReport {
            record,
            peak_in_flight,
            persisted,
        })
    }

    /// Records a run that never dispatched, then hands the error back.
    async fn fail(
        &self,
        err: LoadTestError,
        created_at: DateTime<Utc>,
        sink: &dyn ProgressSink,
        store: &dyn SummaryStore,
    ) -> Result<RunReport, LoadTestError> {
        tracing::error!(run_id = %self.run_id, error = %err, "run failed before dispatch");

        let summary = Aggregator::new(self.config.total_requests).finalize(RunState::Failed)?;
        let record = RunRecord::new(self.run_id.clone(), &self.config, created_at, summary)
            .with_error(err.to_string());

        if let Err(sink_err) = sink.fail(&self.run_id, &err.to_string()).await {
            tracing::warn!(run_id = %self.run_id, error = %sink_err, "progress sink rejected failure");
        }
        self.persist(store, &record);
        self.state_tx.send_replace(RunState::Failed);
        Err(err)
    }

    fn persist(&self, store: &dyn SummaryStore, record: &RunRecord) -> bool {
        match store.save(record) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(run_id = %self.run_id, error = %err, "failed to persist run record");
                false
            },
        }
    }
}

/// Ctrl+C handler with two-phase shutdown.
///
/// First Ctrl+C cancels the run so in-flight requests drain.
/// Second Ctrl+C exits the process immediately.
pub async fn handle_ctrl_c(cancel: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install Ctrl+C handler");
        return;
    }
    eprintln!("\nReceived Ctrl+C, stopping gracefully...");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nReceived second Ctrl+C, aborting immediately.");
        std::process::exit(1);
    }
}
