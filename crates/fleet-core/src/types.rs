//! Domain types for the fleet reconciliation engine.
//!
//! These types describe desired state (groups, inventory), observed state
//! (instances) and the reconciler's outputs (intents, conflict reports).
//! All types serialize to/from JSON for logging and for the conflict-gate
//! output consumed by document review tooling.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier for a hardware class ("flavor"), e.g. `c1.c36m100d50`.
pub type FlavorId = String;

/// Name of a declared group of virtual machines.
pub type GroupName = String;

/// Cloud-assigned identifier of a concrete instance.
pub type InstanceId = String;

// ── Desired state ─────────────────────────────────────────────────

/// Physical-host ceiling per flavor. Immutable within a pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Inventory {
    budgets: BTreeMap<FlavorId, u32>,
}

impl Inventory {
    pub fn new(budgets: BTreeMap<FlavorId, u32>) -> Self {
        Self { budgets }
    }

    /// Ceiling for a flavor, or `None` if the flavor is not in the table.
    pub fn budget(&self, flavor: &str) -> Option<u32> {
        self.budgets.get(flavor).copied()
    }

    pub fn contains(&self, flavor: &str) -> bool {
        self.budgets.contains_key(flavor)
    }

    pub fn flavors(&self) -> impl Iterator<Item = (&FlavorId, u32)> {
        self.budgets.iter().map(|(f, b)| (f, *b))
    }
}

impl FromIterator<(FlavorId, u32)> for Inventory {
    fn from_iter<T: IntoIterator<Item = (FlavorId, u32)>>(iter: T) -> Self {
        Self {
            budgets: iter.into_iter().collect(),
        }
    }
}

/// Activation window for a group, inclusive on both ends at day
/// granularity: the group is active for the entirety of its end date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    /// Whether `today` falls inside the window.
    pub fn contains(&self, today: NaiveDate) -> bool {
        self.start <= today && today <= self.end
    }
}

/// Attached-volume specification for instances of a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Volume size in gigabytes.
    pub size_gb: u32,
    /// Provider volume type.
    pub volume_type: String,
    /// Whether the instance boots from the volume.
    pub boot: bool,
}

impl Default for VolumeSpec {
    fn default() -> Self {
        Self {
            size_gb: 12,
            volume_type: "default".to_string(),
            boot: false,
        }
    }
}

/// A declared group of virtual machines: the unit of desired state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub name: GroupName,
    /// Target instance count while the group is active.
    pub count: u32,
    pub flavor: FlavorId,
    /// Optional activation window; `None` means always on.
    pub window: Option<Window>,
    /// Scheduler group label stamped onto created instances.
    pub label: Option<String>,
    /// Image the group's instances must run. Resolved against the
    /// document default when the group does not override it.
    pub image: Option<String>,
    /// Enable the container runtime on the node.
    pub docker_ready: bool,
    /// Provision GPU drivers and advertise GPUs to the scheduler.
    pub gpu_ready: bool,
    pub volume: Option<VolumeSpec>,
}

impl Group {
    /// Whether this group is a time-bounded training reservation.
    pub fn is_training(&self) -> bool {
        self.name.starts_with("training-")
    }

    /// Attributes to stamp onto instances created for this group.
    pub fn create_attrs(&self) -> CreateAttrs {
        CreateAttrs {
            label: self.label.clone().unwrap_or_else(|| self.name.clone()),
            image: self.image.clone(),
            training: self.is_training(),
            docker_ready: self.docker_ready,
            gpu_ready: self.gpu_ready,
            volume: self.volume.clone(),
        }
    }
}

// ── Observed state ────────────────────────────────────────────────

/// Lifecycle phase of an observed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstancePhase {
    Booting,
    Ready,
    Draining,
    Error,
    Terminated,
}

/// A concrete virtual machine as reported by the cloud.
///
/// Owned by the provider; the core only reads these and issues intents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub id: InstanceId,
    /// Provider-visible name, `{prefix}-{group}-{nnnn}`.
    pub name: String,
    /// Owning group, recovered from the name.
    pub group: GroupName,
    pub flavor: FlavorId,
    /// Image the instance is running, when the provider reports one
    /// (volume-booted instances may not have an image).
    pub image: Option<String>,
    pub phase: InstancePhase,
}

impl Instance {
    /// Instances count toward observed state until they are terminated.
    pub fn is_live(&self) -> bool {
        self.phase != InstancePhase::Terminated
    }
}

// ── Reconciler output ─────────────────────────────────────────────

/// Attributes carried by a `Create` intent for the lifecycle executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateAttrs {
    pub label: String,
    pub image: Option<String>,
    pub training: bool,
    pub docker_ready: bool,
    pub gpu_ready: bool,
    pub volume: Option<VolumeSpec>,
}

/// One create/destroy operation the reconciler wants performed.
///
/// Pure data; executed by the lifecycle executor, never by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReconciliationIntent {
    Create {
        group: GroupName,
        flavor: FlavorId,
        attrs: CreateAttrs,
    },
    Destroy {
        instance_id: InstanceId,
        graceful: bool,
    },
}

// ── Conflicts ─────────────────────────────────────────────────────

/// A period of days; `None` bounds stand for unbounded (always-on
/// groups contribute demand over the whole timeline).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictPeriod {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ConflictPeriod {
    pub fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn days(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

/// A period where combined demand for a flavor exceeds its budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conflict {
    pub flavor: FlavorId,
    pub period: ConflictPeriod,
    /// Peak simultaneous demand over the period.
    pub demanded: u32,
    pub budget: u32,
    /// Groups contributing demand during the period.
    pub groups: Vec<GroupName>,
}

/// Set of detected conflicts. Empty means the document is admissible.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn push(&mut self, conflict: Conflict) {
        self.conflicts.push(conflict);
    }

    pub fn merge(&mut self, other: ConflictReport) {
        self.conflicts.extend(other.conflicts);
    }
}
