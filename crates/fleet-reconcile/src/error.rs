use thiserror::Error;

use fleet_cloud::CloudError;
use fleet_core::ValidationError;

/// Errors that abort a reconciliation pass before any intent executes.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("cloud observation failed: {0}")]
    Cloud(#[from] CloudError),
}
