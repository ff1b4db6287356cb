//! Desired-state document parsing and invariant validation.
//!
//! The document is a single YAML file declaring the node inventory and
//! the named groups operators want running. Schema validation happens
//! upstream of this crate; the business-logic invariants the schema
//! cannot express (`start <= end`, both-or-neither window bounds,
//! flavors present in the inventory) are enforced here.

use std::path::Path;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{FlavorId, Group, GroupName, Inventory, VolumeSpec, Window};

/// Per-group section of the document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupSpec {
    pub count: u32,
    pub flavor: FlavorId,
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    /// Scheduler group label; defaults to the group name.
    #[serde(default, rename = "group")]
    pub label: Option<String>,
    /// Image override; the document-level default applies otherwise.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub docker_ready: bool,
    #[serde(default)]
    pub gpu_ready: bool,
    #[serde(default)]
    pub volume: Option<VolumeSpec>,
}

fn default_prefix() -> String {
    "vgcnbwc".to_string()
}

fn default_graceful() -> bool {
    true
}

/// The declarative desired-state document.
///
/// Group declaration order is preserved: the capacity clamp reduces
/// demand starting from the most recently declared group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetDocument {
    /// Physical hosts available per flavor.
    #[serde(rename = "nodes_inventory")]
    pub inventory: Inventory,
    /// Named groups, in declaration order.
    pub deployment: IndexMap<GroupName, GroupSpec>,
    /// Drain nodes before destroying them.
    #[serde(default = "default_graceful")]
    pub graceful: bool,
    /// Instance name prefix; names are `{prefix}-{group}-{nnnn}`.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Default image for groups that don't override it.
    #[serde(default)]
    pub image: Option<String>,
    /// Key pair name for created instances.
    #[serde(default)]
    pub sshkey: Option<String>,
    /// Network to attach created instances to.
    #[serde(default)]
    pub network: Option<String>,
    /// Security groups to assign to created instances.
    #[serde(default)]
    pub secgroups: Vec<String>,
}

impl FleetDocument {
    pub fn from_yaml(content: &str) -> Result<Self, ValidationError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// The declared groups in declaration order, with per-group images
    /// resolved against the document default.
    pub fn groups(&self) -> Vec<Group> {
        self.deployment
            .iter()
            .map(|(name, spec)| Group {
                name: name.clone(),
                count: spec.count,
                flavor: spec.flavor.clone(),
                window: match (spec.start, spec.end) {
                    (Some(start), Some(end)) => Some(Window { start, end }),
                    _ => None,
                },
                label: spec.label.clone(),
                image: spec.image.clone().or_else(|| self.image.clone()),
                docker_ready: spec.docker_ready,
                gpu_ready: spec.gpu_ready,
                volume: spec.volume.clone(),
            })
            .collect()
    }

    /// Enforce the invariants schema validation does not express.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, spec) in &self.deployment {
            match (spec.start, spec.end) {
                (Some(start), Some(end)) if start > end => {
                    return Err(ValidationError::WindowInverted {
                        group: name.clone(),
                        start,
                        end,
                    });
                }
                (Some(_), None) | (None, Some(_)) => {
                    return Err(ValidationError::WindowHalfOpen {
                        group: name.clone(),
                    });
                }
                _ => {}
            }
            if !self.inventory.contains(&spec.flavor) {
                return Err(ValidationError::UnknownFlavor {
                    group: name.clone(),
                    flavor: spec.flavor.clone(),
                });
            }
        }
        validate_groups(&self.groups())
    }
}

/// Reject duplicate group names.
///
/// Documents parsed from YAML mappings cannot carry duplicates, but
/// programmatically assembled group lists can.
pub fn validate_groups(groups: &[Group]) -> Result<(), ValidationError> {
    let mut seen = std::collections::HashSet::new();
    for group in groups {
        if !seen.insert(group.name.as_str()) {
            return Err(ValidationError::DuplicateGroup(group.name.clone()));
        }
    }
    Ok(())
}
