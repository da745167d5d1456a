//! `stresslab run` command implementation.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use stresslab::loadtest::config::{HttpMethod, RunConfig};
use stresslab::loadtest::controller::{handle_ctrl_c, Controller, RunReport};
use stresslab::loadtest::display::LiveDisplay;
use stresslab::loadtest::sink::JsonLinesSink;
use stresslab::loadtest::store::{validate_run_id, JsonFileStore, MemoryStore, SummaryStore};
use stresslab::loadtest::summary::render_summary;

/// Requests issued when neither a config file nor `--requests` sets a budget.
const DEFAULT_TOTAL_REQUESTS: u32 = 50;

/// Concurrency used when neither a config file nor `--concurrency` sets one.
const DEFAULT_CONCURRENCY: u32 = 10;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Target URL (required unless --config provides one)
    #[arg(long, env = "STRESSLAB_URL")]
    pub url: Option<String>,

    /// HTTP method: GET, POST, PUT, DELETE, PATCH, HEAD or OPTIONS
    #[arg(long, short = 'X')]
    pub method: Option<HttpMethod>,

    /// Total number of requests to issue
    #[arg(long, short = 'n')]
    pub requests: Option<u32>,

    /// Maximum simultaneous in-flight requests
    #[arg(long, short = 'c')]
    pub concurrency: Option<u32>,

    /// Free-form label stored with the run
    #[arg(long)]
    pub label: Option<String>,

    /// Path to a TOML run config; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Run id to store the record under (default: random UUID)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Emit JSON-lines progress events on stdout instead of the live display
    #[arg(long)]
    pub json: bool,

    /// Do not persist the run record
    #[arg(long)]
    pub no_store: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Execute the `run` command.
///
/// Resolves the config, runs it through a [`Controller`] with Ctrl+C wired
/// to cancellation, then prints the summary (or the final JSON event).
/// The effective config is validated by the controller, so a bad value
/// still yields a `failed` record.
pub async fn execute_run(args: RunArgs, store_dir: PathBuf) -> Result<()> {
    let config = resolve_config(&args)?;
    let run_id = resolve_run_id(&args)?;

    let store: Box<dyn SummaryStore> = if args.no_store {
        Box::new(MemoryStore::new())
    } else {
        Box::new(JsonFileStore::new(&store_dir))
    };

    let controller = Controller::new(run_id, config);
    let ctrl_c = tokio::spawn(handle_ctrl_c(controller.cancel_token()));

    let result = if args.json {
        let sink = JsonLinesSink::stdout();
        controller.run(&sink, store.as_ref()).await
    } else {
        eprintln!();
        eprintln!(
            "  Running {} {} x{} (concurrency {})...",
            controller.config().method,
            controller.config().url,
            controller.config().total_requests,
            controller.config().concurrency
        );
        eprintln!();
        let display = LiveDisplay::new(controller.config().total_requests, args.no_color);
        controller.run(&display, store.as_ref()).await
    };
    ctrl_c.abort();

    let report = result.map_err(|e| anyhow::anyhow!("Load test failed: {e}"))?;
    if !args.json {
        super::configure_color(args.no_color);
        println!("{}", render_summary(&report.record));
        report_storage(&report, &store_dir, args.no_store);
    }
    Ok(())
}

fn report_storage(report: &RunReport, store_dir: &Path, no_store: bool) {
    if no_store {
        return;
    }
    eprintln!();
    if report.persisted {
        eprintln!(
            "Run {} saved to: {}",
            report.record.run_id,
            store_dir.display()
        );
    } else {
        // Non-fatal: the run itself completed
        eprintln!("Warning: run {} could not be saved", report.record.run_id);
    }
}

/// Picks the run id, rejecting one the store could not save under before
/// any request is sent.
fn resolve_run_id(args: &RunArgs) -> Result<String> {
    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if !args.no_store {
        validate_run_id(&run_id).context("Invalid --run-id")?;
    }
    Ok(run_id)
}

/// Builds the run config from `--config` (if any) plus flag overrides.
///
/// File values are not validated here; flags may still correct them.
fn resolve_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            load_config(path)?
        },
        None => {
            let Some(url) = &args.url else {
                anyhow::bail!("No target given.\nUse `--url <URL>` or `--config path/to/run.toml`.");
            };
            RunConfig::new(
                url.clone(),
                HttpMethod::default(),
                DEFAULT_TOTAL_REQUESTS,
                DEFAULT_CONCURRENCY,
            )
        },
    };
    apply_overrides(&mut config, args);
    Ok(config)
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::read(path)
        .inspect_err(|e| tracing::error!(path = %path.display(), error = %e, "unreadable run config"))
        .with_context(|| format!("Failed to load config '{}'", path.display()))
}

/// Apply CLI flag overrides to a resolved config.
fn apply_overrides(config: &mut RunConfig, args: &RunArgs) {
    if let Some(url) = &args.url {
        config.url = url.clone();
    }
    if let Some(method) = args.method {
        config.method = method;
    }
    if let Some(n) = args.requests {
        config.total_requests = n;
    }
    if let Some(c) = args.concurrency {
        config.concurrency = c;
    }
    if let Some(label) = &args.label {
        config.label = Some(label.clone());
    }
    if let Some(ms) = args.timeout_ms {
        config.settings.timeout_ms = ms;
    }
}
