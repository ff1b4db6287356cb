//! fleet-conflict — shared-inventory admission checking.
//!
//! Validates that simultaneous effective demand per flavor never exceeds
//! the physical-host inventory, across all declared groups including
//! time-bounded training reservations booked independently of each other.
//!
//! Two modes:
//! - [`gate`] — pre-commit gate on a proposed document; any conflict
//!   rejects the change.
//! - [`check`] — standing safety net run every reconciliation pass;
//!   surviving conflicts are reported but not fatal.

pub mod sweep;

use thiserror::Error;

use fleet_core::{ConflictReport, FleetDocument};

pub use sweep::check;

/// A proposed document demands more capacity than physically exists.
#[derive(Debug, Error)]
#[error("capacity conflicts detected: {}", summary(report))]
pub struct ConflictError {
    pub report: ConflictReport,
}

fn summary(report: &ConflictReport) -> String {
    report
        .conflicts
        .iter()
        .map(|c| {
            format!(
                "{}: {} demanded, {} available ({})",
                c.flavor,
                c.demanded,
                c.budget,
                c.groups.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Pre-commit gate: admit the document only if it is conflict-free.
///
/// The document's own validation must have passed already; the gate only
/// answers the capacity question.
pub fn gate(doc: &FleetDocument) -> Result<(), ConflictError> {
    let report = check(&doc.groups(), &doc.inventory);
    if report.is_empty() {
        Ok(())
    } else {
        Err(ConflictError { report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_rejects_overbooked_document() {
        let doc = FleetDocument::from_yaml(
            r#"
nodes_inventory:
  gpu: 4
deployment:
  training-x:
    count: 3
    flavor: gpu
    start: 2024-01-01
    end: 2024-01-10
  training-y:
    count: 3
    flavor: gpu
    start: 2024-01-05
    end: 2024-01-15
"#,
        )
        .unwrap();

        let err = gate(&doc).unwrap_err();
        assert_eq!(err.report.conflicts.len(), 1);
        let msg = err.to_string();
        assert!(msg.contains("gpu"));
        assert!(msg.contains("training-x"));
    }

    #[test]
    fn gate_admits_fitting_document() {
        let doc = FleetDocument::from_yaml(
            r#"
nodes_inventory:
  small: 10
deployment:
  compute:
    count: 8
    flavor: small
"#,
        )
        .unwrap();
        assert!(gate(&doc).is_ok());
    }
}
