//! k6-style terminal rendering of run results.
//!
//! [`render_summary`] and [`render_history`] are pure functions: they take
//! run records and return a formatted [`String`]. Color comes from the
//! `colored` crate and honours its global override, which the CLI turns
//! off for `--no-color` or piped output.

use colored::Colorize;

use crate::loadtest::controller::RunState;
use crate::loadtest::store::RunRecord;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 32;

/// Render a k6-style summary of one run.
///
/// # Layout
///
/// ```text
///           /\      |  stresslab run 5d1c...
///          /  \     |
///     /\  /    \    |  target:      GET http://localhost:8080/health
///    /  \/      \   |  requests:    200 (concurrency 20)
///   /    \       \  |  state:       completed
///  /      \       \ |  label:       smoke
///
///   http_req_duration.............: avg=12.40ms  min=9.10ms  max=40.02ms
///   http_req_percentiles..........: p50=11.90ms  p90=15.00ms  p95=18.20ms  p99=39.90ms
///   http_reqs.....................: 200 of 200
///   http_req_success..............: 198
///   http_req_failed...............: 2 (1.0%)
///   http_req_transport_errors.....: 0
///   http_req_throughput...........: 640.2 req/s
///   run_elapsed...................: 0.31s
///
///   status codes:
///     200.........................: 198
///     503.........................: 2
/// ```
pub fn render_summary(record: &RunRecord) -> String {
    let summary = &record.summary;
    let latency = &summary.latency;
    let mut lines = Vec::new();

    lines.push(render_header(record));

    if let Some(error) = &record.error {
        lines.push(format_metric_row("error", &error.red().to_string()));
        return lines.join("\n");
    }

    let duration = format!(
        "avg={:.2}ms  min={:.2}ms  max={:.2}ms",
        latency.avg, latency.min, latency.max
    );
    lines.push(format_metric_row("http_req_duration", &duration));

    let percentiles = format!(
        "p50={:.2}ms  p90={:.2}ms  p95={:.2}ms  p99={:.2}ms",
        latency.p50, latency.p90, latency.p95, latency.p99
    );
    let percentiles = if latency.p99 < 1000.0 {
        percentiles.green().to_string()
    } else {
        percentiles.yellow().to_string()
    };
    lines.push(format_metric_row("http_req_percentiles", &percentiles));

    lines.push(format_metric_row(
        "http_reqs",
        &format!("{} of {}", summary.completed, summary.total),
    ));
    lines.push(format_metric_row(
        "http_req_success",
        &summary.success.to_string().green().to_string(),
    ));

    let failed_pct = summary.error_rate() * 100.0;
    let failed = format!("{} ({failed_pct:.1}%)", summary.failure);
    let failed = if failed_pct > 5.0 {
        failed.red().to_string()
    } else if failed_pct > 1.0 {
        failed.yellow().to_string()
    } else {
        failed
    };
    lines.push(format_metric_row("http_req_failed", &failed));

    let transport = if summary.transport_errors > 0 {
        summary.transport_errors.to_string().red().to_string()
    } else {
        summary.transport_errors.to_string()
    };
    lines.push(format_metric_row("http_req_transport_errors", &transport));

    lines.push(format_metric_row(
        "http_req_throughput",
        &format!("{:.1} req/s", summary.rps).green().to_string(),
    ));
    lines.push(format_metric_row(
        "run_elapsed",
        &format!("{:.2}s", summary.elapsed),
    ));

    if !summary.status_codes.is_empty() {
        lines.push(String::new());
        lines.push("  status codes:".to_string());
        for (bucket, count) in &summary.status_codes {
            let count = if is_success_bucket(bucket, record.success_status_ceiling) {
                count.to_string().green().to_string()
            } else {
                count.to_string().red().to_string()
            };
            lines.push(format_metric_row(&format!("  {bucket}"), &count));
        }
    }

    lines.join("\n")
}

/// Render a one-row-per-run table, in the order given.
pub fn render_history(records: &[RunRecord]) -> String {
    if records.is_empty() {
        return "  no runs recorded".to_string();
    }

    let mut lines = Vec::new();
    lines.push(format!(
        "  {:<36} {:<20} {:<10} {:>9} {:>8} {:>9}  {}",
        "run id", "created", "state", "completed", "failed", "rps", "target"
    ));
    lines.push(format!("  {}", "\u{2500}".repeat(110)));

    for record in records {
        let summary = &record.summary;
        lines.push(format!(
            "  {:<36} {:<20} {:<10} {:>9} {:>8} {:>9}  {} {}",
            truncate(&record.run_id, 36),
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            colored_state(record.state),
            format!("{}/{}", summary.completed, summary.total),
            summary.failure,
            format!("{:.1}", summary.rps),
            record.method,
            record.url,
        ));
    }
    lines.join("\n")
}

fn render_header(record: &RunRecord) -> String {
    format!(
        r#"
          /\      |  {} {}
         /  \     |
    /\  /    \    |  target:      {} {}
   /  \/      \   |  requests:    {} (concurrency {})
  /    \       \  |  state:       {}
 /      \       \ |  label:       {}
"#,
        "stresslab run".bold(),
        record.run_id,
        record.method,
        record.url,
        record.total_requests,
        record.concurrency,
        colored_state(record.state),
        record.label.as_deref().unwrap_or("-"),
    )
}

fn colored_state(state: RunState) -> String {
    // Pad before coloring so escape codes don't break column alignment.
    let text = format!("{:<10}", state.as_str());
    match state {
        RunState::Completed => text.green().to_string(),
        RunState::Cancelled => text.yellow().to_string(),
        RunState::Failed => text.red().to_string(),
        RunState::Pending | RunState::Running => text,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 3).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

/// Whether a status bucket counts toward successes under `ceiling`.
fn is_success_bucket(bucket: &str, ceiling: u16) -> bool {
    bucket
        .parse::<u16>()
        .is_ok_and(|code| (200..ceiling).contains(&code))
}

/// Produces: `"  metric_name..................: value_string"`
fn format_metric_row(name: &str, value: &str) -> String {
    format!("  {name:.<PAD_WIDTH$}: {value}")
}
