//! Persistence of finished runs.
//!
//! Each run produces one [`RunRecord`], saved exactly once through a
//! [`SummaryStore`] under its caller-assigned run id. [`JsonFileStore`]
//! keeps one pretty-printed JSON file per run so history survives the
//! process; [`MemoryStore`] backs tests and embedders.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::loadtest::aggregator::Summary;
use crate::loadtest::config::{HttpMethod, RunConfig};
use crate::loadtest::controller::RunState;
use crate::loadtest::error::LoadTestError;

/// Schema version for persisted run records.
///
/// Increment when making breaking changes to the record layout.
pub const SCHEMA_VERSION: &str = "1.0";

/// Durable history row for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Record format version for parser compatibility.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Caller-assigned run id.
    pub run_id: String,
    /// Target URL.
    pub url: String,
    /// HTTP method used for every request.
    pub method: HttpMethod,
    /// Request budget.
    pub total_requests: u32,
    /// Concurrency limit.
    pub concurrency: u32,
    /// Exclusive upper bound of the success status range.
    #[serde(default = "crate::loadtest::config::default_success_status_ceiling")]
    pub success_status_ceiling: u16,
    /// Optional free-form label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// When the run was accepted.
    pub created_at: DateTime<Utc>,
    /// When the run reached its terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal state.
    pub state: RunState,
    /// Failure reason for runs that never dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Final aggregate.
    pub summary: Summary,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl RunRecord {
    /// Builds a terminal record for `config` from its summary.
    pub fn new(
        run_id: impl Into<String>,
        config: &RunConfig,
        created_at: DateTime<Utc>,
        summary: Summary,
    ) -> Self {
        Self {
            schema_version: default_schema_version(),
            run_id: run_id.into(),
            url: config.url.clone(),
            method: config.method,
            total_requests: config.total_requests,
            concurrency: config.concurrency,
            success_status_ceiling: config.settings.success_status_ceiling,
            label: config.label.clone(),
            created_at,
            finished_at: Some(Utc::now()),
            state: summary.state,
            error: None,
            summary,
        }
    }

    /// Attaches a failure reason.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Durable sink for finished runs, plus the history queries.
pub trait SummaryStore: Send + Sync {
    /// Persists a record. Called once per run by the controller.
    fn save(&self, record: &RunRecord) -> Result<(), LoadTestError>;

    /// Looks up one run by id.
    fn load(&self, run_id: &str) -> Result<Option<RunRecord>, LoadTestError>;

    /// Returns every stored run, newest first.
    fn list(&self) -> Result<Vec<RunRecord>, LoadTestError>;
}

/// Rejects ids that are empty or could escape the store directory.
pub fn validate_run_id(run_id: &str) -> Result<(), LoadTestError> {
    let valid = !run_id.is_empty()
        && run_id.len() <= 128
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !run_id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(LoadTestError::validation(format!(
            "invalid run id '{run_id}': use letters, digits, '-', '_' or '.'"
        )))
    }
}

fn newest_first(records: &mut [RunRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
}

/// In-process store keyed by run id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, RunRecord>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls received, including overwrites.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl SummaryStore for MemoryStore {
    fn save(&self, record: &RunRecord) -> Result<(), LoadTestError> {
        self.records
            .lock()
            .insert(record.run_id.clone(), record.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Option<RunRecord>, LoadTestError> {
        Ok(self.records.lock().get(run_id).cloned())
    }

    fn list(&self) -> Result<Vec<RunRecord>, LoadTestError> {
        let mut records: Vec<RunRecord> = self.records.lock().values().cloned().collect();
        newest_first(&mut records);
        Ok(records)
    }
}

/// One `<run_id>.json` file per run inside a directory.
///
/// The directory is created on first save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file for `run_id`.
    pub fn record_path(&self, run_id: &str) -> Result<PathBuf, LoadTestError> {
        validate_run_id(run_id)?;
        Ok(self.dir.join(format!("{run_id}.json")))
    }

    fn persistence(source: std::io::Error, path: &Path) -> LoadTestError {
        LoadTestError::Persistence {
            source,
            path: path.display().to_string(),
        }
    }

    fn read_record(path: &Path) -> Result<RunRecord, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|e| Self::persistence(e, path))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl SummaryStore for JsonFileStore {
    fn save(&self, record: &RunRecord) -> Result<(), LoadTestError> {
        let path = self.record_path(&record.run_id)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| Self::persistence(e, &self.dir))?;

        let json = serde_json::to_string_pretty(record)?;
        // Write beside the target, then rename, so readers never see a partial file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| Self::persistence(e, &tmp))?;
        std::fs::rename(&tmp, &path).map_err(|e| Self::persistence(e, &path))?;

        tracing::debug!(run_id = %record.run_id, path = %path.display(), "run record saved");
        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Option<RunRecord>, LoadTestError> {
        let path = self.record_path(run_id)?;
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).map(Some)
    }

    fn list(&self) -> Result<Vec<RunRecord>, LoadTestError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|e| Self::persistence(e, &self.dir))?;
        let mut records = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| Self::persistence(e, &self.dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable run record");
                },
            }
        }
        newest_first(&mut records);
        Ok(records)
    }
}
