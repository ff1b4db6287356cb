//! Cross-group planning: per-group diffs plus the capacity clamp.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use fleet_core::{
    Conflict, ConflictPeriod, ConflictReport, FlavorId, Group, Instance, Inventory,
    ReconciliationIntent,
};

use crate::diff::{group_delta, GroupPlan, PhaseThenId, SelectionStrategy};

/// Knobs for planning a pass.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Drain scheduler agents before destroying instances.
    pub graceful: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { graceful: true }
    }
}

/// The plan for one pass: intents to execute plus capacity warnings.
#[derive(Debug, Clone, Default)]
pub struct PassPlan {
    pub intents: Vec<ReconciliationIntent>,
    pub warnings: ConflictReport,
}

impl PassPlan {
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

/// Plan the intents that converge observed state onto the declared
/// groups, clamped to the inventory.
///
/// Pure: same inputs, same plan. Executing the full plan and planning
/// again yields an empty plan.
pub fn reconcile(
    groups: &[Group],
    observed: &[Instance],
    inventory: &Inventory,
    today: NaiveDate,
    config: &ReconcileConfig,
) -> PassPlan {
    reconcile_with_strategy(groups, observed, inventory, today, config, &PhaseThenId)
}

/// [`reconcile`] with an explicit scale-down selection strategy.
pub fn reconcile_with_strategy(
    groups: &[Group],
    observed: &[Instance],
    inventory: &Inventory,
    today: NaiveDate,
    config: &ReconcileConfig,
    strategy: &dyn SelectionStrategy,
) -> PassPlan {
    let mut by_group: HashMap<&str, Vec<Instance>> = HashMap::new();
    for instance in observed {
        by_group
            .entry(instance.group.as_str())
            .or_default()
            .push(instance.clone());
    }

    for name in by_group.keys() {
        if !groups.iter().any(|g| g.name == **name) {
            // Not ours to manage; an operator may have declared it in a
            // document we haven't seen. Flag it and move on.
            warn!(group = %name, "observed instances for an undeclared group");
        }
    }

    let empty = Vec::new();
    let mut plans: Vec<GroupPlan> = groups
        .iter()
        .map(|group| {
            let observed_for_group = by_group.get(group.name.as_str()).unwrap_or(&empty);
            group_delta(group, observed_for_group, today, strategy)
        })
        .collect();

    let warnings = clamp_to_inventory(groups, observed, inventory, today, &mut plans);

    let mut intents = Vec::new();
    // Destroys first so freed hosts are available to the creates, and
    // so replacement pairs stay capacity-neutral.
    for plan in &plans {
        for instance_id in plan.destroys.iter().chain(plan.replacements.iter()) {
            intents.push(ReconciliationIntent::Destroy {
                instance_id: instance_id.clone(),
                graceful: config.graceful,
            });
        }
    }
    for plan in &plans {
        let group = groups
            .iter()
            .find(|g| g.name == plan.group)
            .cloned();
        let Some(group) = group else { continue };
        let replacement_creates = plan.replacements.len() as u32;
        for _ in 0..(plan.creates + replacement_creates) {
            intents.push(ReconciliationIntent::Create {
                group: group.name.clone(),
                flavor: group.flavor.clone(),
                attrs: group.create_attrs(),
            });
        }
    }

    debug!(intents = intents.len(), warnings = warnings.conflicts.len(), "plan ready");
    PassPlan { intents, warnings }
}

/// Reduce planned creates so no flavor exceeds its budget.
///
/// Replacement pairs are capacity-neutral (their destroy executes first)
/// and are never reduced; only plain creates are. When demand exceeds
/// the remaining budget, the most recently declared groups lose first.
fn clamp_to_inventory(
    groups: &[Group],
    observed: &[Instance],
    inventory: &Inventory,
    today: NaiveDate,
    plans: &mut [GroupPlan],
) -> ConflictReport {
    let mut live: HashMap<&FlavorId, u32> = HashMap::new();
    for instance in observed.iter().filter(|i| i.is_live()) {
        *live.entry(&instance.flavor).or_default() += 1;
    }

    // Slots freed by plain destroys. Replacement destroys are reclaimed
    // by their paired create and cancel out.
    let mut freed: HashMap<FlavorId, u32> = HashMap::new();
    for plan in plans.iter() {
        *freed.entry(plan.flavor.clone()).or_default() += plan.destroys.len() as u32;
    }

    let mut report = ConflictReport::default();
    let flavors: Vec<FlavorId> = {
        let mut f: Vec<FlavorId> = plans.iter().map(|p| p.flavor.clone()).collect();
        f.sort();
        f.dedup();
        f
    };

    for flavor in &flavors {
        let budget = match inventory.budget(flavor) {
            Some(budget) => budget,
            None => {
                warn!(flavor = %flavor, "flavor missing from inventory, assuming zero budget");
                0
            }
        };
        let occupied = live.get(flavor).copied().unwrap_or(0);
        let occupied_after = occupied.saturating_sub(freed.get(flavor).copied().unwrap_or(0));
        let available = budget.saturating_sub(occupied_after);

        let demanded: u32 = plans
            .iter()
            .filter(|p| &p.flavor == flavor)
            .map(|p| p.creates)
            .sum();
        if demanded <= available {
            continue;
        }

        let mut overflow = demanded - available;
        let mut losers = Vec::new();
        for plan in plans.iter_mut().rev().filter(|p| &p.flavor == flavor) {
            if overflow == 0 {
                break;
            }
            let cut = plan.creates.min(overflow);
            if cut > 0 {
                plan.creates -= cut;
                overflow -= cut;
                losers.push(plan.group.clone());
            }
        }
        losers.reverse();

        warn!(
            flavor = %flavor,
            demanded = occupied_after + demanded,
            budget,
            "insufficient capacity, reducing creates"
        );
        report.push(Conflict {
            flavor: flavor.clone(),
            period: ConflictPeriod::days(today, today),
            demanded: occupied_after + demanded,
            budget,
            groups: losers,
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{InstancePhase, Window};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn group(name: &str, count: u32, flavor: &str) -> Group {
        Group {
            name: name.to_string(),
            count,
            flavor: flavor.to_string(),
            window: None,
            label: None,
            image: Some("vggp-v60".to_string()),
            docker_ready: false,
            gpu_ready: false,
            volume: None,
        }
    }

    fn instance(id: &str, group: &str, flavor: &str) -> Instance {
        Instance {
            id: id.to_string(),
            name: format!("vgcnbwc-{group}-{id}"),
            group: group.to_string(),
            flavor: flavor.to_string(),
            image: Some("vggp-v60".to_string()),
            phase: InstancePhase::Ready,
        }
    }

    fn inventory(pairs: &[(&str, u32)]) -> Inventory {
        pairs
            .iter()
            .map(|(f, b)| (f.to_string(), *b))
            .collect()
    }

    fn creates(plan: &PassPlan) -> usize {
        plan.intents
            .iter()
            .filter(|i| matches!(i, ReconciliationIntent::Create { .. }))
            .count()
    }

    fn destroys(plan: &PassPlan) -> usize {
        plan.intents
            .iter()
            .filter(|i| matches!(i, ReconciliationIntent::Destroy { .. }))
            .count()
    }

    #[test]
    fn scale_up_emits_creates() {
        let groups = [group("compute", 3, "small")];
        let plan = reconcile(
            &groups,
            &[],
            &inventory(&[("small", 10)]),
            date("2024-01-01"),
            &ReconcileConfig::default(),
        );
        assert_eq!(creates(&plan), 3);
        assert_eq!(destroys(&plan), 0);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn converged_fleet_plans_nothing() {
        let groups = [group("compute", 2, "small")];
        let observed = [
            instance("a", "compute", "small"),
            instance("b", "compute", "small"),
        ];
        let plan = reconcile(
            &groups,
            &observed,
            &inventory(&[("small", 10)]),
            date("2024-01-01"),
            &ReconcileConfig::default(),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn clamp_reduces_last_declared_group_first() {
        let groups = [group("compute", 4, "small"), group("training-x", 3, "small")];
        let plan = reconcile(
            &groups,
            &[],
            &inventory(&[("small", 5)]),
            date("2024-01-01"),
            &ReconcileConfig::default(),
        );
        assert_eq!(creates(&plan), 5);
        let training_creates = plan
            .intents
            .iter()
            .filter(
                |i| matches!(i, ReconciliationIntent::Create { group, .. } if group == "training-x"),
            )
            .count();
        assert_eq!(training_creates, 1);
        assert_eq!(plan.warnings.conflicts.len(), 1);
        assert_eq!(plan.warnings.conflicts[0].demanded, 7);
        assert_eq!(plan.warnings.conflicts[0].budget, 5);
        assert_eq!(plan.warnings.conflicts[0].groups, vec!["training-x".to_string()]);
    }

    #[test]
    fn clamp_counts_foreign_occupancy() {
        // Live instances of an undeclared group still occupy hosts.
        let groups = [group("compute", 4, "small")];
        let observed = [instance("x", "legacy", "small")];
        let plan = reconcile(
            &groups,
            &observed,
            &inventory(&[("small", 4)]),
            date("2024-01-01"),
            &ReconcileConfig::default(),
        );
        assert_eq!(creates(&plan), 3);
        assert!(!plan.warnings.is_empty());
    }

    #[test]
    fn freed_slots_are_reusable_within_the_pass() {
        // Expired training group frees hosts the compute group can take.
        let mut training = group("training-x", 2, "small");
        training.window = Some(Window {
            start: date("2024-01-01"),
            end: date("2024-01-10"),
        });
        let groups = [group("compute", 4, "small"), training];
        let observed = [
            instance("c1", "compute", "small"),
            instance("c2", "compute", "small"),
            instance("t1", "training-x", "small"),
            instance("t2", "training-x", "small"),
        ];
        let plan = reconcile(
            &groups,
            &observed,
            &inventory(&[("small", 4)]),
            date("2024-02-01"),
            &ReconcileConfig::default(),
        );
        assert_eq!(destroys(&plan), 2);
        assert_eq!(creates(&plan), 2);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn missing_budget_is_zero() {
        let groups = [group("compute", 2, "phantom")];
        let plan = reconcile(
            &groups,
            &[],
            &inventory(&[("small", 10)]),
            date("2024-01-01"),
            &ReconcileConfig::default(),
        );
        assert_eq!(creates(&plan), 0);
        assert_eq!(plan.warnings.conflicts[0].budget, 0);
    }

    #[test]
    fn replacements_survive_a_full_budget() {
        // Fleet at budget, one instance on a stale image: the pair still
        // goes through because its destroy frees the slot.
        let groups = [group("compute", 2, "small")];
        let mut stale = instance("old", "compute", "small");
        stale.image = Some("vggp-v59".to_string());
        let observed = [instance("a", "compute", "small"), stale];
        let plan = reconcile(
            &groups,
            &observed,
            &inventory(&[("small", 2)]),
            date("2024-01-01"),
            &ReconcileConfig::default(),
        );
        assert_eq!(destroys(&plan), 1);
        assert_eq!(creates(&plan), 1);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn destroys_are_ordered_before_creates() {
        let mut training = group("training-x", 0, "small");
        training.window = None;
        let groups = [group("compute", 1, "small"), training];
        let observed = [instance("t1", "training-x", "small")];
        let plan = reconcile(
            &groups,
            &observed,
            &inventory(&[("small", 1)]),
            date("2024-01-01"),
            &ReconcileConfig::default(),
        );
        assert!(matches!(plan.intents[0], ReconciliationIntent::Destroy { .. }));
        assert!(matches!(plan.intents[1], ReconciliationIntent::Create { .. }));
    }

    #[test]
    fn graceful_flag_flows_into_destroy_intents() {
        let groups = [group("compute", 0, "small")];
        let observed = [instance("a", "compute", "small")];
        let plan = reconcile(
            &groups,
            &observed,
            &inventory(&[("small", 4)]),
            date("2024-01-01"),
            &ReconcileConfig { graceful: false },
        );
        assert!(matches!(
            plan.intents[0],
            ReconciliationIntent::Destroy { graceful: false, .. }
        ));
    }

    #[test]
    fn executing_the_plan_reaches_a_fixed_point() {
        let groups = [group("compute", 3, "small"), group("upload", 1, "small")];
        let observed = vec![instance("a", "compute", "small")];
        let inv = inventory(&[("small", 10)]);
        let today = date("2024-01-01");
        let config = ReconcileConfig::default();

        let plan = reconcile(&groups, &observed, &inv, today, &config);

        // Apply the plan to the observed state by hand.
        let mut next = observed;
        let mut seq = 0;
        for intent in &plan.intents {
            match intent {
                ReconciliationIntent::Destroy { instance_id, .. } => {
                    next.retain(|i| &i.id != instance_id);
                }
                ReconciliationIntent::Create { group, flavor, .. } => {
                    seq += 1;
                    next.push(instance(&format!("new-{seq}"), group, flavor));
                }
            }
        }

        let second = reconcile(&groups, &next, &inv, today, &config);
        assert!(second.is_empty());
        assert!(second.warnings.is_empty());
    }

    #[test]
    fn raising_a_count_never_lowers_its_creates() {
        let observed = [instance("a", "compute", "small")];
        let inv = inventory(&[("small", 8)]);
        let today = date("2024-01-01");
        let config = ReconcileConfig::default();

        let mut previous = 0;
        for count in 1..=8 {
            let groups = [group("compute", count, "small")];
            let plan = reconcile(&groups, &observed, &inv, today, &config);
            let n = creates(&plan);
            assert!(n >= previous, "creates dropped from {previous} to {n} at count {count}");
            previous = n;
        }
    }

    #[test]
    fn selection_strategy_is_substitutable() {
        struct NewestIdFirst;
        impl crate::diff::SelectionStrategy for NewestIdFirst {
            fn order_for_destroy<'a>(&self, candidates: &mut Vec<&'a Instance>) {
                candidates.sort_by(|a, b| b.id.cmp(&a.id));
            }
        }

        let groups = [group("compute", 1, "small")];
        let observed = [
            instance("a", "compute", "small"),
            instance("b", "compute", "small"),
            instance("c", "compute", "small"),
        ];
        let inv = inventory(&[("small", 10)]);
        let plan = reconcile_with_strategy(
            &groups,
            &observed,
            &inv,
            date("2024-01-01"),
            &ReconcileConfig::default(),
            &NewestIdFirst,
        );

        let destroyed: Vec<&str> = plan
            .intents
            .iter()
            .filter_map(|i| match i {
                ReconciliationIntent::Destroy { instance_id, .. } => Some(instance_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(destroyed, vec!["c", "b"]);
    }

    #[test]
    fn capacity_is_never_exceeded() {
        // Net occupancy after the plan stays within every budget.
        let groups = [
            group("compute", 6, "small"),
            group("upload", 3, "small"),
            group("gpu", 2, "big"),
        ];
        let observed = [
            instance("a", "compute", "small"),
            instance("b", "legacy", "small"),
        ];
        let inv = inventory(&[("small", 5), ("big", 1)]);
        let plan = reconcile(
            &groups,
            &observed,
            &inv,
            date("2024-01-01"),
            &ReconcileConfig::default(),
        );

        let mut occupancy: HashMap<String, i64> = HashMap::new();
        occupancy.insert("small".to_string(), 2);
        occupancy.insert("big".to_string(), 0);
        for intent in &plan.intents {
            match intent {
                ReconciliationIntent::Create { flavor, .. } => {
                    *occupancy.get_mut(flavor.as_str()).unwrap() += 1;
                }
                ReconciliationIntent::Destroy { .. } => {
                    *occupancy.get_mut("small").unwrap() -= 1;
                }
            }
        }
        assert!(occupancy["small"] <= 5);
        assert!(occupancy["big"] <= 1);
        assert_eq!(plan.warnings.conflicts.len(), 2);
    }
}
