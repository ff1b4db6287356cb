//! fleetd — declarative fleet reconciliation for OpenStack compute pools.
//!
//! Reads a desired-state document (inventory + named groups with counts,
//! flavors and activation windows) and converges the cloud onto it:
//!
//! - `run` — reconcile continuously on a fixed interval
//! - `sync` — one reconciliation pass
//! - `check` — admission-check a proposed document
//!
//! # Usage
//!
//! ```text
//! fleetd --resources resources.yaml run --interval 300
//! fleetd --resources resources.yaml sync --dry-run
//! fleetd --resources proposed.yaml check
//! ```

mod runner;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use fleet_core::FleetDocument;
use fleet_reconcile::{PassConfig, PassOutcome};

use crate::runner::Runner;

#[derive(Parser)]
#[command(name = "fleetd", about = "Fleet reconciliation daemon")]
struct Cli {
    /// Path to the desired-state document.
    #[arg(long, default_value = "resources.yaml")]
    resources: PathBuf,

    /// First-boot user data file passed to new instances.
    #[arg(long)]
    user_data: Option<PathBuf>,

    /// Plan and log intents without executing anything.
    #[arg(long)]
    dry_run: bool,

    /// Override the document's graceful-destroy flag.
    #[arg(long)]
    graceful: Option<bool>,

    /// Concurrent intent executions.
    #[arg(long, default_value = "4")]
    max_inflight: usize,

    /// Hard per-intent timeout in seconds.
    #[arg(long, default_value = "900")]
    intent_timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile continuously on a fixed interval.
    Run {
        /// Seconds between passes.
        #[arg(long, default_value = "300")]
        interval: u64,
    },

    /// Run a single reconciliation pass.
    Sync,

    /// Admission-check the document and print the conflict report.
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleetd=debug,fleet=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "fleetd failed");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let user_data = match &cli.user_data {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => None,
    };
    let pass = PassConfig {
        max_inflight: cli.max_inflight,
        intent_timeout: Duration::from_secs(cli.intent_timeout),
        dry_run: cli.dry_run,
        graceful: cli.graceful,
    };
    let runner = Runner::new(cli.resources.clone(), user_data, pass);

    match cli.command {
        Command::Run { interval } => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let loop_handle = tokio::spawn(async move {
                runner.run(Duration::from_secs(interval), shutdown_rx).await;
            });

            tokio::signal::ctrl_c().await?;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            let _ = loop_handle.await;

            info!("fleetd stopped");
            Ok(ExitCode::SUCCESS)
        }

        Command::Sync => {
            let outcome = runner.pass_once().await?;
            Ok(exit_code(&outcome))
        }

        Command::Check => {
            let doc = FleetDocument::from_file(&cli.resources)?;
            doc.validate()?;
            let report = fleet_conflict::check(&doc.groups(), &doc.inventory);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.is_empty() {
                info!("document admitted");
                Ok(ExitCode::SUCCESS)
            } else {
                error!(conflicts = report.conflicts.len(), "document rejected");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Exit status for one-shot passes: 0 clean, 2 converged with capacity
/// warnings. Aborted passes surface as errors and exit 1.
fn exit_code(outcome: &PassOutcome) -> ExitCode {
    match outcome {
        PassOutcome::Clean | PassOutcome::Skipped => ExitCode::SUCCESS,
        PassOutcome::Warnings(_) => ExitCode::from(2),
    }
}
