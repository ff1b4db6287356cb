//! fleet-reconcile — planning and execution of reconciliation passes.
//!
//! The planning half ([`reconcile`]) is pure: given the declared groups,
//! an observed snapshot and the inventory, it emits create/destroy
//! intents and capacity warnings. The execution half ([`PassRunner`])
//! wires planning to a [`fleet_cloud::CloudObserver`] and
//! [`fleet_cloud::LifecycleExecutor`] with single-flight semantics and
//! bounded-concurrency intent execution.

pub mod diff;
pub mod error;
pub mod pass;
pub mod reconcile;

pub use diff::{group_delta, GroupPlan, PhaseThenId, SelectionStrategy};
pub use error::ReconcileError;
pub use pass::{PassConfig, PassOutcome, PassRunner};
pub use reconcile::{reconcile, reconcile_with_strategy, PassPlan, ReconcileConfig};
