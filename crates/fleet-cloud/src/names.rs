//! Instance name allocation.

use std::collections::HashSet;

use crate::CloudError;

/// Highest sequence number tried under a prefix.
const MAX_SEQ: u32 = 10_000;

/// First free name of the form `{prefix}-NNNN`.
///
/// Scans sequence numbers in order so freed slots are reused and the
/// result is deterministic given the same set of existing names.
pub fn unique_name(prefix: &str, existing: &HashSet<String>) -> Result<String, CloudError> {
    for seq in 0..MAX_SEQ {
        let name = format!("{prefix}-{seq:04}");
        if !existing.contains(&name) {
            return Ok(name);
        }
    }
    Err(CloudError::NamesExhausted(prefix.to_string()))
}

/// Recover the group name from an instance name.
///
/// Names are `{fleet_prefix}-{group}-{nnnn}`; returns `None` for names
/// that don't match (instances the fleet does not own).
pub fn parse_group(fleet_prefix: &str, name: &str) -> Option<String> {
    let rest = name.strip_prefix(fleet_prefix)?.strip_prefix('-')?;
    let (group, seq) = rest.rsplit_once('-')?;
    if group.is_empty() || seq.is_empty() || !seq.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(group.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_first_free_slot() {
        let existing: HashSet<String> = ["vgcnbwc-compute-0000", "vgcnbwc-compute-0002"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let name = unique_name("vgcnbwc-compute", &existing).unwrap();
        assert_eq!(name, "vgcnbwc-compute-0001");
    }

    #[test]
    fn empty_set_starts_at_zero() {
        let name = unique_name("vgcnbwc-upload", &HashSet::new()).unwrap();
        assert_eq!(name, "vgcnbwc-upload-0000");
    }

    #[test]
    fn exhausted_namespace_is_an_error() {
        let existing: HashSet<String> = (0..10_000)
            .map(|i| format!("vgcnbwc-compute-{i:04}"))
            .collect();
        assert!(matches!(
            unique_name("vgcnbwc-compute", &existing),
            Err(CloudError::NamesExhausted(_))
        ));
    }

    #[test]
    fn parse_group_round_trip() {
        assert_eq!(
            parse_group("vgcnbwc", "vgcnbwc-compute-0004").as_deref(),
            Some("compute")
        );
        // Group names may themselves contain dashes.
        assert_eq!(
            parse_group("vgcnbwc", "vgcnbwc-training-denbi24-0001").as_deref(),
            Some("training-denbi24")
        );
    }

    #[test]
    fn parse_group_rejects_foreign_names() {
        assert_eq!(parse_group("vgcnbwc", "jenkins-worker-0001"), None);
        assert_eq!(parse_group("vgcnbwc", "vgcnbwc-compute-abcd"), None);
        assert_eq!(parse_group("vgcnbwc", "vgcnbwc"), None);
    }
}
