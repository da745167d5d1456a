//! `stresslab history` and `stresslab show` command implementations.

use anyhow::{Context, Result};
use std::path::Path;

use stresslab::loadtest::store::{JsonFileStore, RunRecord, SummaryStore};
use stresslab::loadtest::summary::{render_history, render_summary};

/// Execute the `history` command.
pub fn list(store_dir: &Path, limit: Option<usize>, json: bool, no_color: bool) -> Result<()> {
    let store = JsonFileStore::new(store_dir);
    let records = newest(&store, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        super::configure_color(no_color);
        println!("{}", render_history(&records));
    }
    Ok(())
}

/// Execute the `show` command.
pub fn show(store_dir: &Path, run_id: &str, json: bool, no_color: bool) -> Result<()> {
    let store = JsonFileStore::new(store_dir);
    let Some(record) = store
        .load(run_id)
        .with_context(|| format!("Failed to read run '{run_id}'"))?
    else {
        anyhow::bail!(
            "Run '{run_id}' not found in {}\nUse `stresslab history` to list stored runs.",
            store_dir.display()
        );
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        super::configure_color(no_color);
        println!("{}", render_summary(&record));
    }
    Ok(())
}

fn newest(store: &dyn SummaryStore, limit: Option<usize>) -> Result<Vec<RunRecord>> {
    let mut records = store.list().context("Failed to list stored runs")?;
    if let Some(n) = limit {
        records.truncate(n);
    }
    Ok(records)
}
