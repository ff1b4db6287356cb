//! Window evaluator — effective demand of a group at a point in time.

use chrono::NaiveDate;

use crate::types::Group;

/// Effective desired count of a group on a given day.
///
/// A group without a window is always on. A windowed group demands its
/// full count from `start` through `end` inclusive, and zero outside.
///
/// Pure function of `(group, today)`. Callers must evaluate every group
/// of a pass against the same `today` so that no group sees a window
/// boundary the others don't.
pub fn effective_count(group: &Group, today: NaiveDate) -> u32 {
    match &group.window {
        None => group.count,
        Some(window) if window.contains(today) => group.count,
        Some(_) => 0,
    }
}
