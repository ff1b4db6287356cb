//! fleet-cloud — the seams between the reconciliation core and the cloud.
//!
//! The core depends only on the two traits here:
//! - [`CloudObserver`] answers "what is running right now"
//! - [`LifecycleExecutor`] performs create/destroy operations
//!
//! [`OpenStackCli`] implements both against an OpenStack-compatible cloud
//! by driving the `openstack` command-line client with JSON output, the
//! same interface the operators use by hand.

pub mod drain;
pub mod names;
pub mod openstack;

use async_trait::async_trait;
use thiserror::Error;

use fleet_core::{CreateAttrs, Instance, InstanceId};

pub use names::unique_name;
pub use openstack::OpenStackCli;

/// Errors from cloud interactions.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("command `{command}` failed: {detail}")]
    Command { command: String, detail: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unparseable provider response: {0}")]
    Response(#[from] serde_json::Error),

    #[error("{name} did not reach {target} within {seconds}s")]
    StateTimeout {
        name: String,
        target: String,
        seconds: u64,
    },

    #[error("no free name under prefix {0}")]
    NamesExhausted(String),

    #[error("inconsistent cloud state: {0}")]
    Inconsistent(String),
}

/// Read-only view of the fleet's instances.
///
/// Implementations must always query live state; the reconciler never
/// trusts a cached view, since operators act on the same cloud account.
#[async_trait]
pub trait CloudObserver: Send + Sync {
    /// List all instances whose name carries the fleet prefix.
    async fn list_instances(&self, prefix: &str) -> Result<Vec<Instance>, CloudError>;
}

/// Executes create/destroy intents against the cloud.
#[async_trait]
pub trait LifecycleExecutor: Send + Sync {
    /// Boot a new instance under `name`. Returns once the provider has
    /// accepted the request and the instance has a stable identity.
    async fn create(
        &self,
        name: &str,
        flavor: &str,
        attrs: &CreateAttrs,
    ) -> Result<InstanceId, CloudError>;

    /// Remove an instance. A graceful destroy drains the node's
    /// scheduler agent first; an immediate destroy deletes outright.
    async fn destroy(&self, instance_id: &InstanceId, graceful: bool) -> Result<(), CloudError>;
}
