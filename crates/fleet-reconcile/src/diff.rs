//! Per-group diff between desired and observed state.
//!
//! Pure functions producing a [`GroupPlan`] per declared group. Capacity
//! is not considered here; the cross-group clamp happens in
//! [`crate::reconcile`].

use chrono::NaiveDate;

use fleet_core::{effective_count, FlavorId, Group, GroupName, Instance, InstanceId};

/// What one group needs to converge on its effective count.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPlan {
    pub group: GroupName,
    pub flavor: FlavorId,
    /// New instances to boot.
    pub creates: u32,
    /// Instances to remove (scale-down, window expiry, strays).
    pub destroys: Vec<InstanceId>,
    /// Instances running the wrong image: destroyed and booted again.
    pub replacements: Vec<InstanceId>,
}

impl GroupPlan {
    /// Whether the plan changes anything.
    pub fn is_noop(&self) -> bool {
        self.creates == 0 && self.destroys.is_empty() && self.replacements.is_empty()
    }
}

/// Orders scale-down candidates; the first entries are destroyed first.
///
/// The default prefers failed and still-booting instances so healthy
/// capacity survives a scale-down. Tests substitute other orderings.
pub trait SelectionStrategy: Send + Sync {
    fn order_for_destroy<'a>(&self, candidates: &mut Vec<&'a Instance>);
}

/// Default strategy: `Error` first, then `Booting`, then `Draining`,
/// then `Ready`, ties broken by instance id for determinism.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhaseThenId;

impl SelectionStrategy for PhaseThenId {
    fn order_for_destroy<'a>(&self, candidates: &mut Vec<&'a Instance>) {
        candidates.sort_by(|a, b| {
            phase_rank(a)
                .cmp(&phase_rank(b))
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

fn phase_rank(instance: &Instance) -> u8 {
    use fleet_core::InstancePhase::*;
    match instance.phase {
        Error => 0,
        Booting => 1,
        Draining => 2,
        Ready => 3,
        Terminated => 4, // never a candidate; excluded upstream
    }
}

/// Diff one group against its observed instances.
///
/// `observed` must already be filtered to this group. Terminated
/// instances are ignored entirely.
pub fn group_delta(
    group: &Group,
    observed: &[Instance],
    today: NaiveDate,
    strategy: &dyn SelectionStrategy,
) -> GroupPlan {
    let target = effective_count(group, today) as usize;
    let mut live: Vec<&Instance> = observed.iter().filter(|i| i.is_live()).collect();

    let mut destroys = Vec::new();
    if live.len() > target {
        strategy.order_for_destroy(&mut live);
        destroys = live
            .drain(..live.len() - target)
            .map(|i| i.id.clone())
            .collect();
    }
    let creates = target.saturating_sub(live.len()) as u32;

    // Survivors running a different image than the group declares get
    // replaced. Volume-booted instances report no image; leave those be.
    let replacements = match &group.image {
        Some(wanted) => live
            .iter()
            .filter(|i| i.image.as_ref().is_some_and(|have| have != wanted))
            .map(|i| i.id.clone())
            .collect(),
        None => Vec::new(),
    };

    GroupPlan {
        group: group.name.clone(),
        flavor: group.flavor.clone(),
        creates,
        destroys,
        replacements,
    }
}
