//! fleet-core — shared data model for the fleet reconciliation engine.
//!
//! Holds the types the rest of the workspace agrees on:
//! - The desired-state document (`FleetDocument`) and its groups
//! - The physical-host inventory (`Inventory`)
//! - Observed cloud instances (`Instance`, `InstancePhase`)
//! - Reconciliation intents and conflict reports
//! - The window evaluator (`effective_count`)
//!
//! Everything here is pure data plus pure functions; no I/O.

pub mod cost;
pub mod document;
pub mod error;
pub mod types;
pub mod window;

pub use document::{FleetDocument, GroupSpec};
pub use error::ValidationError;
pub use types::{
    Conflict, ConflictPeriod, ConflictReport, CreateAttrs, FlavorId, Group, GroupName, Instance,
    InstanceId, InstancePhase, Inventory, ReconciliationIntent, VolumeSpec, Window,
};
pub use window::effective_count;
