//! stresslab: bounded-concurrency HTTP load generation with live progress.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Stress-test an HTTP endpoint and keep a history of runs
#[derive(Parser)]
#[command(name = "stresslab")]
#[command(about = "Stress-test an HTTP endpoint and keep a history of runs", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding stored run records
    #[arg(
        long,
        global = true,
        env = "STRESSLAB_STORE_DIR",
        default_value = ".stresslab/runs"
    )]
    store_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test
    ///
    /// Issues a fixed number of requests against the target with bounded
    /// concurrency, shows live progress, prints a summary, and stores the
    /// run record. Ctrl+C stops gracefully; a second Ctrl+C aborts.
    Run(commands::run::RunArgs),

    /// List stored runs, newest first
    History {
        /// Show at most this many runs
        #[arg(long)]
        limit: Option<usize>,

        /// Print records as a JSON array
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Show one stored run
    Show {
        /// Run id as printed by `run` or `history`
        run_id: String,

        /// Print the raw JSON record
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    execute_command(cli.command, cli.store_dir)
}

/// Logs go to stderr so stdout stays clean for summaries and JSON output.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stresslab=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn execute_command(command: Commands, store_dir: PathBuf) -> Result<()> {
    match command {
        Commands::Run(args) => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(commands::run::execute_run(args, store_dir))
        },
        Commands::History {
            limit,
            json,
            no_color,
        } => commands::history::list(&store_dir, limit, json, no_color),
        Commands::Show {
            run_id,
            json,
            no_color,
        } => commands::history::show(&store_dir, &run_id, json, no_color),
    }
}
