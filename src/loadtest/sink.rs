//! Progress sinks: where snapshots go while a run is active.
//!
//! The controller calls [`ProgressSink::publish`] once per tick, in
//! emission order, then [`ProgressSink::finish`] with the final summary.
//! A run that fails before dispatch reports through [`ProgressSink::fail`]
//! instead. Sink failures are logged by the controller and never abort a run.

use std::io::Write;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::loadtest::aggregator::{Snapshot, Summary};
use crate::loadtest::error::LoadTestError;

/// Receiver of a run's progress stream.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Delivers one periodic snapshot.
    async fn publish(&self, run_id: &str, snapshot: &Snapshot) -> Result<(), LoadTestError>;

    /// Delivers the terminal summary. Called at most once per run.
    async fn finish(&self, _run_id: &str, _summary: &Summary) -> Result<(), LoadTestError> {
        Ok(())
    }

    /// Reports a run that failed before any request was dispatched.
    async fn fail(&self, _run_id: &str, _message: &str) -> Result<(), LoadTestError> {
        Ok(())
    }
}

/// One message of the event stream forwarded to remote viewers.
///
/// Serialized with a `type` tag:
///
/// ```json
/// {"type":"progress","run_id":"r1","snapshot":{"completed":3,...}}
/// {"type":"done","run_id":"r1","summary":{...}}
/// {"type":"error","run_id":"r1","message":"..."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Periodic snapshot while the run is active.
    Progress { run_id: String, snapshot: Snapshot },
    /// Final summary of a completed or cancelled run.
    Done { run_id: String, summary: Summary },
    /// The run failed before dispatch.
    Error { run_id: String, message: String },
}

impl RunEvent {
    /// Run this event belongs to.
    pub fn run_id(&self) -> &str {
        match self {
            Self::Progress { run_id, .. } | Self::Done { run_id, .. } | Self::Error { run_id, .. } => {
                run_id
            },
        }
    }
}

/// Collects everything it receives. Used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemorySink {
    snapshots: Mutex<Vec<Snapshot>>,
    summary: Mutex<Option<Summary>>,
    failure: Mutex<Option<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots received so far, in publish order.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().clone()
    }

    /// The summary passed to `finish`, if any.
    pub fn summary(&self) -> Option<Summary> {
        self.summary.lock().clone()
    }

    /// The message passed to `fail`, if any.
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}

#[async_trait]
impl ProgressSink for MemorySink {
    async fn publish(&self, _run_id: &str, snapshot: &Snapshot) -> Result<(), LoadTestError> {
        self.snapshots.lock().push(snapshot.clone());
        Ok(())
    }

    async fn finish(&self, _run_id: &str, summary: &Summary) -> Result<(), LoadTestError> {
        *self.summary.lock() = Some(summary.clone());
        Ok(())
    }

    async fn fail(&self, _run_id: &str, message: &str) -> Result<(), LoadTestError> {
        *self.failure.lock() = Some(message.to_string());
        Ok(())
    }
}

/// Forwards [`RunEvent`]s into a tokio mpsc channel.
///
/// A bounded channel applies backpressure to the controller's tick loop;
/// a dropped receiver turns every delivery into a [`LoadTestError::Sink`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<RunEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        Self { tx }
    }

    /// Creates a sink together with the receiving end of its channel.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    async fn send(&self, event: RunEvent) -> Result<(), LoadTestError> {
        self.tx.send(event).await.map_err(|_| LoadTestError::Sink {
            message: "event receiver dropped".to_string(),
        })
    }
}

#[async_trait]
impl ProgressSink for ChannelSink {
    async fn publish(&self, run_id: &str, snapshot: &Snapshot) -> Result<(), LoadTestError> {
        self.send(RunEvent::Progress {
            run_id: run_id.to_string(),
            snapshot: snapshot.clone(),
        })
        .await
    }

    async fn finish(&self, run_id: &str, summary: &Summary) -> Result<(), LoadTestError> {
        self.send(RunEvent::Done {
            run_id: run_id.to_string(),
            summary: summary.clone(),
        })
        .await
    }

    async fn fail(&self, run_id: &str, message: &str) -> Result<(), LoadTestError> {
        self.send(RunEvent::Error {
            run_id: run_id.to_string(),
            message: message.to_string(),
        })
        .await
    }
}

/// Writes one JSON-encoded [`RunEvent`] per line, flushing after each.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl JsonLinesSink<std::io::Stdout> {
    /// Sink writing to the process's stdout.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_event(&self, event: &RunEvent) -> Result<(), LoadTestError> {
        let line = serde_json::to_string(event)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|e| LoadTestError::Sink {
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl<W: Write + Send> ProgressSink for JsonLinesSink<W> {
    async fn publish(&self, run_id: &str, snapshot: &Snapshot) -> Result<(), LoadTestError> {
        self.write_event(&RunEvent::Progress {
            run_id: run_id.to_string(),
            snapshot: snapshot.clone(),
        })
    }

    async fn finish(&self, run_id: &str, summary: &Summary) -> Result<(), LoadTestError> {
        self.write_event(&RunEvent::Done {
            run_id: run_id.to_string(),
            summary: summary.clone(),
        })
    }

    async fn fail(&self, run_id: &str, message: &str) -> Result<(), LoadTestError> {
        self.write_event(&RunEvent::Error {
            run_id: run_id.to_string(),
            message: message.to_string(),
        })
    }
}
