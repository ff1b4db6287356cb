//! Graceful node drain over ssh.
//!
//! Before a graceful destroy, the node's HTCondor agent is told to stop
//! accepting work and the drain is polled until running jobs finish or
//! the deadline expires. Commands run through the system `ssh` client;
//! nodes authenticate the operator key, not the other way around.

use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::CloudError;

/// Parameters for draining a node's scheduler agent.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Login user on the node.
    pub username: String,
    /// Total time to wait for running work to finish.
    pub deadline: Duration,
    /// Time between drain status polls.
    pub interval: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            username: "centos".to_string(),
            deadline: Duration::from_secs(300),
            interval: Duration::from_secs(10),
        }
    }
}

/// Drain the scheduler agent on `address`, then switch it off.
///
/// Returns an error if the node stays busy past the deadline; the caller
/// decides whether to delete anyway or retry on the next pass.
pub async fn drain_node(address: &str, config: &DrainConfig) -> Result<(), CloudError> {
    let mut waited = Duration::ZERO;

    loop {
        request_drain(address, config).await?;

        if !agent_active(address, config).await? {
            break;
        }

        if waited >= config.deadline {
            return Err(CloudError::StateTimeout {
                name: address.to_string(),
                target: "drained".to_string(),
                seconds: config.deadline.as_secs(),
            });
        }

        debug!(address, "node still busy, waiting for drain");
        tokio::time::sleep(config.interval).await;
        waited += config.interval;
    }

    // Drained; make sure the agent leaves the pool promptly.
    ssh(address, config, "/usr/sbin/condor_off -graceful `hostname -f`").await?;
    Ok(())
}

/// Ask the agent to drain. Tolerates the node already draining or the
/// agent already being gone.
async fn request_drain(address: &str, config: &DrainConfig) -> Result<(), CloudError> {
    let output = ssh_raw(address, config, "condor_drain `hostname -f`").await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let acceptable = stdout.contains("Sent request to drain")
        || stderr.contains("Draining already in progress")
        || stderr.contains("Can't find address");
    if !acceptable {
        warn!(address, %stdout, %stderr, "unexpected condor_drain output");
        return Err(CloudError::Command {
            command: "condor_drain".to_string(),
            detail: stderr.trim().to_string(),
        });
    }
    Ok(())
}

/// Whether the agent still advertises busy slots.
async fn agent_active(address: &str, config: &DrainConfig) -> Result<bool, CloudError> {
    let output = ssh_raw(address, config, "condor_status | grep slot.*@`hostname -f`").await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    // One remaining slot line means the partitionable parent only; more
    // means jobs are still running.
    Ok(stdout.lines().filter(|l| !l.trim().is_empty()).count() > 1)
}

async fn ssh(address: &str, config: &DrainConfig, command: &str) -> Result<(), CloudError> {
    let output = ssh_raw(address, config, command).await?;
    if !output.status.success() {
        return Err(CloudError::Command {
            command: format!("ssh {address} {command}"),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

async fn ssh_raw(address: &str, config: &DrainConfig, command: &str) -> Result<Output, CloudError> {
    debug!(address, command, "remote command");
    let output = Command::new("ssh")
        .arg("-o")
        .arg("BatchMode=yes")
        .arg("-o")
        .arg("StrictHostKeyChecking=accept-new")
        .arg(format!("{}@{}", config.username, address))
        .arg(command)
        .output()
        .await?;
    Ok(output)
}
