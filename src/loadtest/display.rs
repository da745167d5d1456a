//! k6-style live terminal display for run progress.
//!
//! Renders an in-place progress bar on stderr with completed/total and a
//! one-line status of throughput, P95 latency, failures and elapsed time.
//! Updates once per snapshot tick, not per request.

use std::io::IsTerminal;
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::loadtest::aggregator::{Snapshot, Summary};
use crate::loadtest::error::LoadTestError;
use crate::loadtest::sink::ProgressSink;

/// Live terminal display driven as a [`ProgressSink`].
pub struct LiveDisplay {
    bar: ProgressBar,
}

impl LiveDisplay {
    /// Create a new live display for a run of `total_requests`.
    ///
    /// If `no_color` is true or stderr is not a terminal (piped), color
    /// output is disabled; a non-terminal stderr also hides the bar.
    pub fn new(total_requests: u32, no_color: bool) -> Self {
        let is_terminal = std::io::stderr().is_terminal();
        if no_color || !is_terminal {
            colored::control::set_override(false);
        }

        let target = if is_terminal {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(u64::from(total_requests)), target);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len}  {wide_msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
        .progress_chars("=> ");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Format a single line of live status from a snapshot.
    ///
    /// Color coding:
    /// - Green for healthy metrics
    /// - Red for failures (when failure > 0)
    /// - Yellow for high P95 latency (> 1000ms)
    pub fn format_status(snap: &Snapshot) -> String {
        let rps = format!("{:.1}", snap.rps).green();
        let p95 = format!("{:.1}ms", snap.p95);
        let p95 = if snap.p95 > 1000.0 {
            p95.yellow().to_string()
        } else {
            p95.green().to_string()
        };

        let failure_rate = if snap.completed > 0 {
            snap.failure as f64 / snap.completed as f64 * 100.0
        } else {
            0.0
        };
        let failures = format!("{} ({failure_rate:.1}%)", snap.failure);
        let failures = if snap.failure > 0 {
            failures.red().to_string()
        } else {
            failures
        };

        format!(
            "rps: {rps}  |  p95: {p95}  |  failed: {failures}  |  elapsed: {:.1}s",
            snap.elapsed
        )
    }

    /// Update the display with the latest snapshot.
    pub fn update(&self, snap: &Snapshot) {
        self.bar.set_position(snap.completed);
        self.bar.set_message(Self::format_status(snap));
    }

    /// Stop the display and clear the bar.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[async_trait]
impl ProgressSink for LiveDisplay {
    async fn publish(&self, _run_id: &str, snapshot: &Snapshot) -> Result<(), LoadTestError> {
        self.update(snapshot);
        Ok(())
    }

    async fn finish(&self, _run_id: &str, _summary: &Summary) -> Result<(), LoadTestError> {
        LiveDisplay::finish(self);
        Ok(())
    }

    async fn fail(&self, _run_id: &str, _message: &str) -> Result<(), LoadTestError> {
        LiveDisplay::finish(self);
        Ok(())
    }
}

impl Drop for LiveDisplay {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
