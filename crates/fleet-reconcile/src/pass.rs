//! The pass runner: observe, plan, execute.
//!
//! One pass at a time; a tick that arrives while a pass is still running
//! is skipped, not queued. Validation, the standing conflict gate and
//! the cloud observation all run before any intent executes, so a pass
//! either starts from a consistent snapshot or aborts untouched.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

use fleet_cloud::{unique_name, CloudObserver, LifecycleExecutor};
use fleet_core::{ConflictReport, CreateAttrs, FleetDocument, ReconciliationIntent};

use crate::error::ReconcileError;
use crate::reconcile::{reconcile, ReconcileConfig};

/// How a completed pass went.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// Converged without capacity shortfalls.
    Clean,
    /// Converged as far as the inventory allowed.
    Warnings(ConflictReport),
    /// Another pass was still running; nothing happened.
    Skipped,
}

/// Execution knobs for the pass runner.
#[derive(Debug, Clone)]
pub struct PassConfig {
    /// Concurrent intent executions.
    pub max_inflight: usize,
    /// Hard ceiling per intent, drain included.
    pub intent_timeout: Duration,
    /// Plan and log, execute nothing.
    pub dry_run: bool,
    /// Overrides the document's `graceful` flag when set.
    pub graceful: Option<bool>,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            max_inflight: 4,
            intent_timeout: Duration::from_secs(900),
            dry_run: false,
            graceful: None,
        }
    }
}

/// Runs reconciliation passes against a cloud.
pub struct PassRunner<O, E> {
    observer: Arc<O>,
    executor: Arc<E>,
    config: PassConfig,
    running: Mutex<()>,
}

/// A create intent with its reserved instance name.
struct NamedCreate {
    name: String,
    flavor: String,
    attrs: CreateAttrs,
}

impl<O, E> PassRunner<O, E>
where
    O: CloudObserver + 'static,
    E: LifecycleExecutor + 'static,
{
    pub fn new(observer: Arc<O>, executor: Arc<E>, config: PassConfig) -> Self {
        Self {
            observer,
            executor,
            config,
            running: Mutex::new(()),
        }
    }

    /// Run one pass for `today` against the document.
    ///
    /// Individual intent failures do not fail the pass; the next pass
    /// re-observes and retries whatever is still off target.
    pub async fn run(
        &self,
        doc: &FleetDocument,
        today: NaiveDate,
    ) -> Result<PassOutcome, ReconcileError> {
        let Ok(_guard) = self.running.try_lock() else {
            info!("previous pass still running, skipping this tick");
            return Ok(PassOutcome::Skipped);
        };

        doc.validate()?;

        // Standing safety net: the gate should have caught conflicts at
        // commit time, but documents can land out of band.
        let mut warnings = fleet_conflict::check(&doc.groups(), &doc.inventory);
        if !warnings.is_empty() {
            warn!(
                conflicts = warnings.conflicts.len(),
                "document carries standing capacity conflicts"
            );
        }

        let observed = self.observer.list_instances(&doc.prefix).await?;
        info!(instances = observed.len(), "observed fleet");

        let reconcile_config = ReconcileConfig {
            graceful: self.config.graceful.unwrap_or(doc.graceful),
        };
        let plan = reconcile(
            &doc.groups(),
            &observed,
            &doc.inventory,
            today,
            &reconcile_config,
        );

        if plan.is_empty() {
            info!("fleet converged, nothing to do");
        } else if self.config.dry_run {
            for intent in &plan.intents {
                info!(intent = %describe(intent), "dry-run, would execute");
            }
        } else {
            let existing: HashSet<String> = observed.iter().map(|i| i.name.clone()).collect();
            let (creates, destroys) = assign_names(&doc.prefix, existing, &plan.intents)?;
            self.execute(creates, destroys).await;
        }

        warnings.merge(plan.warnings);
        if warnings.is_empty() {
            Ok(PassOutcome::Clean)
        } else {
            Ok(PassOutcome::Warnings(warnings))
        }
    }

    async fn execute(&self, creates: Vec<NamedCreate>, destroys: Vec<(String, bool)>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_inflight));
        let timeout = self.config.intent_timeout;
        let mut handles = Vec::new();

        // Destroys go out first so replacement creates land on freed
        // hosts even when they overlap in flight.
        for (instance_id, graceful) in destroys {
            let executor = Arc::clone(&self.executor);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else { return };
                let work = executor.destroy(&instance_id, graceful);
                match tokio::time::timeout(timeout, work).await {
                    Ok(Ok(())) => info!(instance_id = %instance_id, "destroyed"),
                    Ok(Err(err)) => {
                        warn!(instance_id = %instance_id, error = %err, "destroy failed")
                    }
                    Err(_) => warn!(instance_id = %instance_id, "destroy timed out"),
                }
            }));
        }
        for create in creates {
            let executor = Arc::clone(&self.executor);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else { return };
                let work = executor.create(&create.name, &create.flavor, &create.attrs);
                match tokio::time::timeout(timeout, work).await {
                    Ok(Ok(id)) => info!(name = %create.name, id = %id, "created"),
                    Ok(Err(err)) => {
                        warn!(name = %create.name, error = %err, "create failed")
                    }
                    Err(_) => warn!(name = %create.name, "create timed out"),
                }
            }));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "intent task panicked");
            }
        }
    }
}

/// Reserve an instance name for every create intent.
///
/// Names are taken serially from the observed-name set so concurrent
/// creates within a pass cannot collide.
fn assign_names(
    prefix: &str,
    mut existing: HashSet<String>,
    intents: &[ReconciliationIntent],
) -> Result<(Vec<NamedCreate>, Vec<(String, bool)>), ReconcileError> {
    let mut creates = Vec::new();
    let mut destroys = Vec::new();
    for intent in intents {
        match intent {
            ReconciliationIntent::Create { group, flavor, attrs } => {
                let name = unique_name(&format!("{prefix}-{group}"), &existing)?;
                existing.insert(name.clone());
                creates.push(NamedCreate {
                    name,
                    flavor: flavor.clone(),
                    attrs: attrs.clone(),
                });
            }
            ReconciliationIntent::Destroy { instance_id, graceful } => {
                destroys.push((instance_id.clone(), *graceful));
            }
        }
    }
    Ok((creates, destroys))
}

fn describe(intent: &ReconciliationIntent) -> String {
    match intent {
        ReconciliationIntent::Create { group, flavor, .. } => {
            format!("create {group} ({flavor})")
        }
        ReconciliationIntent::Destroy { instance_id, graceful } => {
            format!(
                "destroy {instance_id} ({})",
                if *graceful { "graceful" } else { "immediate" }
            )
        }
    }
}
