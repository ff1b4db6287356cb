//! Periodic reconciliation loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use fleet_cloud::OpenStackCli;
use fleet_core::FleetDocument;
use fleet_reconcile::{PassConfig, PassOutcome, PassRunner};

/// Owns the paths and knobs needed to run passes repeatedly.
///
/// The document is re-read before every pass so operators can edit it
/// without restarting the daemon.
pub struct Runner {
    resources: PathBuf,
    user_data: Option<String>,
    pass: PassConfig,
}

impl Runner {
    pub fn new(resources: PathBuf, user_data: Option<String>, pass: PassConfig) -> Self {
        Self {
            resources,
            user_data,
            pass,
        }
    }

    /// Reconcile on a fixed interval until the shutdown signal fires.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "reconciliation loop started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.pass_once().await {
                        Ok(PassOutcome::Clean) => {}
                        Ok(PassOutcome::Warnings(report)) => {
                            info!(conflicts = report.conflicts.len(), "pass finished with warnings");
                        }
                        Ok(PassOutcome::Skipped) => {}
                        Err(err) => error!(error = %err, "pass aborted"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciliation loop shutting down");
                    break;
                }
            }
        }
    }

    /// Load the document and run a single pass against the cloud.
    pub async fn pass_once(&self) -> anyhow::Result<PassOutcome> {
        let doc = FleetDocument::from_file(&self.resources)?;

        let mut cloud = OpenStackCli::from_document(&doc);
        if let Some(user_data) = &self.user_data {
            cloud = cloud.with_user_data(user_data.clone());
        }
        let cloud = Arc::new(cloud);

        let runner = PassRunner::new(Arc::clone(&cloud), cloud, self.pass.clone());
        let today = chrono::Local::now().date_naive();
        Ok(runner.run(&doc, today).await?)
    }
}
