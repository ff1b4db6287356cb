//! Validation errors for desired-state documents.

use thiserror::Error;

/// A business-logic invariant the schema cannot express was violated.
///
/// Fatal to the document: nothing is reconciled against it.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("group {group}: window start {start} is after end {end}")]
    WindowInverted {
        group: String,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("group {group}: both start and end must be set, or neither")]
    WindowHalfOpen { group: String },

    #[error("group {group}: flavor {flavor} is not in the node inventory")]
    UnknownFlavor { group: String, flavor: String },

    #[error("duplicate group name: {0}")]
    DuplicateGroup(String),

    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse document: {0}")]
    Parse(#[from] serde_yaml::Error),
}
