//! Interval sweep over group activation windows.
//!
//! For every flavor, each group contributes a closed interval of days:
//! `[start, end]` for windowed groups, the whole timeline for always-on
//! groups. Demand is constant between window boundaries, so it is enough
//! to evaluate each segment between consecutive boundaries once. Equal
//! boundaries overlap: a group ending on day D and another starting on
//! day D compete for the same hosts on that day.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::debug;

use fleet_core::{Conflict, ConflictPeriod, ConflictReport, Group, Inventory, Window};

/// Check all groups against the inventory, one flavor at a time.
///
/// Pure function over the explicit group list; callers decide whether a
/// non-empty report is fatal (pre-commit gate) or a warning (standing
/// check during reconciliation).
pub fn check(groups: &[Group], inventory: &Inventory) -> ConflictReport {
    let mut by_flavor: BTreeMap<&str, Vec<&Group>> = BTreeMap::new();
    for group in groups.iter().filter(|g| g.count > 0) {
        by_flavor.entry(group.flavor.as_str()).or_default().push(group);
    }

    let mut report = ConflictReport::default();
    for (flavor, flavor_groups) in by_flavor {
        // A flavor absent from the inventory has zero physical hosts.
        let budget = inventory.budget(flavor).unwrap_or(0);
        check_flavor(flavor, budget, &flavor_groups, &mut report);
    }
    report
}

/// Demand over one segment of days with constant demand.
struct Segment {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    demanded: u32,
    groups: Vec<String>,
}

fn check_flavor(flavor: &str, budget: u32, groups: &[&Group], report: &mut ConflictReport) {
    let mut baseline: u32 = 0;
    let mut baseline_names: Vec<String> = Vec::new();
    let mut windowed: Vec<(Window, u32, &str)> = Vec::new();
    for group in groups {
        match group.window {
            None => {
                baseline += group.count;
                baseline_names.push(group.name.clone());
            }
            Some(window) => windowed.push((window, group.count, group.name.as_str())),
        }
    }

    // Demand changes only where a window opens (start) or has just
    // closed (end + 1 day).
    let mut boundaries: BTreeSet<NaiveDate> = BTreeSet::new();
    for (window, _, _) in &windowed {
        boundaries.insert(window.start);
        boundaries.insert(next_day(window.end));
    }

    let mut violations: Vec<Segment> = Vec::new();
    let mut push_violation = |segment: Segment| {
        if segment.demanded > budget {
            debug!(
                flavor,
                demanded = segment.demanded,
                budget,
                "demand exceeds inventory"
            );
            violations.push(segment);
        }
    };

    if boundaries.is_empty() {
        // Always-on groups only: one unbounded segment.
        push_violation(Segment {
            start: None,
            end: None,
            demanded: baseline,
            groups: baseline_names.clone(),
        });
    } else {
        let days: Vec<NaiveDate> = boundaries.into_iter().collect();
        let first = days[0];
        let last = days[days.len() - 1];

        // Before the first boundary only always-on demand exists.
        push_violation(Segment {
            start: None,
            end: Some(prev_day(first)),
            demanded: baseline,
            groups: baseline_names.clone(),
        });

        // Segments between consecutive boundaries; demand is constant,
        // so sampling the segment's first day is enough.
        for pair in days.windows(2) {
            push_violation(demand_at(
                pair[0],
                Some(prev_day(pair[1])),
                baseline,
                &baseline_names,
                &windowed,
            ));
        }

        // After the last boundary every window has closed.
        push_violation(Segment {
            start: Some(last),
            end: None,
            demanded: baseline,
            groups: baseline_names,
        });
    }

    for merged in merge_adjacent(violations) {
        report.push(Conflict {
            flavor: flavor.to_string(),
            period: ConflictPeriod {
                start: merged.start,
                end: merged.end,
            },
            demanded: merged.demanded,
            budget,
            groups: merged.groups,
        });
    }
}

/// Demand for the segment starting at `sample`.
fn demand_at(
    sample: NaiveDate,
    end: Option<NaiveDate>,
    baseline: u32,
    baseline_names: &[String],
    windowed: &[(Window, u32, &str)],
) -> Segment {
    let mut demanded = baseline;
    let mut names: Vec<String> = baseline_names.to_vec();
    for (window, count, name) in windowed {
        if window.contains(sample) {
            demanded += count;
            names.push((*name).to_string());
        }
    }
    Segment {
        start: Some(sample),
        end,
        demanded,
        groups: names,
    }
}

/// Merge violating segments that touch into one reported period,
/// carrying the peak demand and the union of contributing groups.
fn merge_adjacent(violations: Vec<Segment>) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::new();
    for segment in violations {
        match merged.last_mut() {
            Some(prev) if touches(prev.end, segment.start) => {
                prev.end = segment.end;
                prev.demanded = prev.demanded.max(segment.demanded);
                for name in segment.groups {
                    if !prev.groups.contains(&name) {
                        prev.groups.push(name);
                    }
                }
            }
            _ => merged.push(segment),
        }
    }
    merged
}

fn touches(prev_end: Option<NaiveDate>, next_start: Option<NaiveDate>) -> bool {
    match (prev_end, next_start) {
        (Some(end), Some(start)) => next_day(end) == start,
        // An unbounded end can only be the final segment; an unbounded
        // start only the first. Neither has a successor to touch.
        _ => false,
    }
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(NaiveDate::MAX)
}

fn prev_day(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(NaiveDate::MIN)
}
