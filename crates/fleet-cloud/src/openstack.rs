//! OpenStack-backed observer and lifecycle executor.
//!
//! Drives the `openstack` command-line client with `-f json` output
//! instead of linking an SDK: the CLI is already configured on the
//! operator host (clouds.yaml), and its JSON output is stable. Every
//! observation re-reads live state.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use fleet_core::{CreateAttrs, FleetDocument, Instance, InstanceId, InstancePhase};

use crate::drain::{drain_node, DrainConfig};
use crate::names::parse_group;
use crate::{CloudError, CloudObserver, LifecycleExecutor};

/// One row of `openstack server list -f json`.
#[derive(Debug, Deserialize)]
struct ServerRecord {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Image", default)]
    image: Option<String>,
    #[serde(rename = "Flavor", default)]
    flavor: Option<String>,
}

/// `openstack server show -f json`, reduced to what the executor needs.
#[derive(Debug, Deserialize)]
struct ServerDetail {
    #[serde(default)]
    status: String,
    /// network name → list of addresses.
    #[serde(default)]
    addresses: std::collections::HashMap<String, Vec<String>>,
}

/// Observer + executor talking to an OpenStack-compatible cloud.
pub struct OpenStackCli {
    image: Option<String>,
    sshkey: Option<String>,
    network: Option<String>,
    secgroups: Vec<String>,
    availability_zone: String,
    /// Rendered first-boot user data, passed through opaque.
    user_data: Option<String>,
    drain: DrainConfig,
    boot_timeout: Duration,
    delete_timeout: Duration,
    poll_interval: Duration,
}

impl OpenStackCli {
    /// Build a client from the boot parameters of a document.
    pub fn from_document(doc: &FleetDocument) -> Self {
        Self {
            image: doc.image.clone(),
            sshkey: doc.sshkey.clone(),
            network: doc.network.clone(),
            secgroups: doc.secgroups.clone(),
            availability_zone: "nova".to_string(),
            user_data: None,
            drain: DrainConfig::default(),
            boot_timeout: Duration::from_secs(600),
            delete_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(10),
        }
    }

    /// Attach rendered user data to pass to new instances.
    pub fn with_user_data(mut self, user_data: String) -> Self {
        self.user_data = Some(user_data);
        self
    }

    pub fn with_drain(mut self, drain: DrainConfig) -> Self {
        self.drain = drain;
        self
    }

    async fn os_json<T: serde::de::DeserializeOwned>(
        &self,
        args: &[String],
    ) -> Result<T, CloudError> {
        let mut full = args.to_vec();
        full.push("-f".to_string());
        full.push("json".to_string());
        let stdout = self.os_raw(&full).await?;
        Ok(serde_json::from_slice(&stdout)?)
    }

    async fn os_raw(&self, args: &[String]) -> Result<Vec<u8>, CloudError> {
        debug!(command = %format!("openstack {}", args.join(" ")), "cloud command");
        let output = Command::new("openstack").args(args).output().await?;
        if !output.status.success() {
            return Err(CloudError::Command {
                command: format!("openstack {}", args.join(" ")),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Poll until `name` reaches one of `targets` (or an escape state).
    /// Returns the matching record.
    async fn wait_for_state(
        &self,
        name: &str,
        targets: &[&str],
        escapes: &[&str],
        timeout: Duration,
    ) -> Result<ServerRecord, CloudError> {
        let mut waited = Duration::ZERO;
        loop {
            let servers: Vec<ServerRecord> =
                self.os_json(&["server".to_string(), "list".to_string()]).await?;
            if let Some(server) = servers.into_iter().find(|s| s.name == name) {
                if targets.contains(&server.status.as_str())
                    || escapes.contains(&server.status.as_str())
                {
                    return Ok(server);
                }
            }

            if waited >= timeout {
                return Err(CloudError::StateTimeout {
                    name: name.to_string(),
                    target: targets.join("|"),
                    seconds: timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            waited += self.poll_interval;
        }
    }

    /// Poll until the instance is no longer listed.
    async fn wait_for_deleted(&self, instance_id: &str) -> Result<(), CloudError> {
        let mut waited = Duration::ZERO;
        loop {
            let servers: Vec<ServerRecord> =
                self.os_json(&["server".to_string(), "list".to_string()]).await?;
            if !servers.iter().any(|s| s.id == instance_id) {
                return Ok(());
            }
            if waited >= self.delete_timeout {
                return Err(CloudError::StateTimeout {
                    name: instance_id.to_string(),
                    target: "deleted".to_string(),
                    seconds: self.delete_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            waited += self.poll_interval;
        }
    }

    fn build_create_args(
        &self,
        name: &str,
        flavor: &str,
        attrs: &CreateAttrs,
        user_data_path: Option<&str>,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec!["server".into(), "create".into()];

        let image = attrs.image.as_ref().or(self.image.as_ref());
        if let Some(image) = image {
            args.push("--image".into());
            args.push(image.clone());
        }
        args.push("--flavor".into());
        args.push(flavor.to_string());
        if let Some(key) = &self.sshkey {
            args.push("--key-name".into());
            args.push(key.clone());
        }
        args.push("--availability-zone".into());
        args.push(self.availability_zone.clone());
        if let Some(network) = &self.network {
            args.push("--nic".into());
            args.push(format!("net-id={network}"));
        }
        if let Some(path) = user_data_path {
            args.push("--user-data".into());
            args.push(path.to_string());
        }
        for sg in &self.secgroups {
            args.push("--security-group".into());
            args.push(sg.clone());
        }
        if let Some(volume) = &attrs.volume {
            if volume.boot {
                args.push("--boot-from-volume".into());
                args.push(volume.size_gb.to_string());
            } else {
                args.push("--block-device".into());
                args.push(format!(
                    "source_type=blank,destination_type=volume,volume_size={},volume_type={},delete_on_termination=true",
                    volume.size_gb, volume.volume_type
                ));
            }
        }
        args.push(name.to_string());
        args
    }
}

/// Map a Nova VM status onto the fleet's lifecycle phases.
fn phase_from_status(status: &str) -> InstancePhase {
    match status {
        "ACTIVE" => InstancePhase::Ready,
        "BUILD" | "REBUILD" => InstancePhase::Booting,
        "DELETED" | "SOFT_DELETED" => InstancePhase::Terminated,
        "ERROR" => InstancePhase::Error,
        other => {
            // SHUTOFF, SHELVED, PAUSED and friends are not serving jobs;
            // treat them as failed so scale-down removes them first.
            debug!(status = other, "unrecognized server status");
            InstancePhase::Error
        }
    }
}

fn record_to_instance(record: ServerRecord, prefix: &str) -> Option<Instance> {
    let group = parse_group(prefix, &record.name)?;
    let phase = phase_from_status(&record.status);
    Some(Instance {
        id: record.id,
        name: record.name,
        group,
        flavor: record.flavor.unwrap_or_default(),
        image: record.image.filter(|i| !i.is_empty() && !i.starts_with("N/A")),
        phase,
    })
}

#[async_trait]
impl CloudObserver for OpenStackCli {
    async fn list_instances(&self, prefix: &str) -> Result<Vec<Instance>, CloudError> {
        let servers: Vec<ServerRecord> =
            self.os_json(&["server".to_string(), "list".to_string()]).await?;
        Ok(servers
            .into_iter()
            .filter_map(|record| record_to_instance(record, prefix))
            .collect())
    }
}

#[async_trait]
impl LifecycleExecutor for OpenStackCli {
    async fn create(
        &self,
        name: &str,
        flavor: &str,
        attrs: &CreateAttrs,
    ) -> Result<InstanceId, CloudError> {
        // The CLI takes user data as a file; keep the handle alive until
        // the command has run.
        let user_data_file = match &self.user_data {
            Some(content) => {
                let mut file = tempfile::Builder::new().prefix("fleet-userdata.").tempfile()?;
                file.write_all(content.as_bytes())?;
                Some(file)
            }
            None => None,
        };
        let user_data_path = user_data_file
            .as_ref()
            .and_then(|f| f.path().to_str().map(|s| s.to_string()));

        info!(name, flavor, label = %attrs.label, "launching instance");
        let args = self.build_create_args(name, flavor, attrs, user_data_path.as_deref());

        #[derive(Deserialize)]
        struct Created {
            id: String,
        }
        let created: Created = self.os_json(&args).await?;

        let record = self
            .wait_for_state(name, &["ACTIVE"], &["ERROR"], self.boot_timeout)
            .await?;
        if record.status == "ERROR" {
            // Failed boots hold a quota slot; remove the wreck now and
            // let the next pass retry the create.
            warn!(name, "instance failed to boot, removing");
            self.os_raw(&["server".to_string(), "delete".to_string(), record.id.clone()])
                .await?;
            return Err(CloudError::Command {
                command: format!("server create {name}"),
                detail: "instance entered ERROR state".to_string(),
            });
        }

        info!(name, id = %created.id, "instance active");
        Ok(created.id)
    }

    async fn destroy(&self, instance_id: &InstanceId, graceful: bool) -> Result<(), CloudError> {
        let detail: ServerDetail = self
            .os_json(&["server".to_string(), "show".to_string(), instance_id.clone()])
            .await?;

        if graceful && detail.status == "ACTIVE" {
            let address = detail
                .addresses
                .values()
                .flatten()
                .next()
                .ok_or_else(|| {
                    CloudError::Inconsistent(format!("{instance_id} has no addresses"))
                })?;
            info!(instance_id = %instance_id, address = %address, "draining before destroy");
            drain_node(address, &self.drain).await?;
        }

        info!(instance_id = %instance_id, graceful, "deleting instance");
        self.os_raw(&["server".to_string(), "delete".to_string(), instance_id.clone()])
            .await?;
        self.wait_for_deleted(instance_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::VolumeSpec;

    fn cli() -> OpenStackCli {
        let doc = FleetDocument::from_yaml(
            r#"
nodes_inventory:
  c1.small: 4
image: vggp-v60
sshkey: cloud2
network: galaxy-net
secgroups: [ufr-ingress, internal]
deployment:
  compute:
    count: 1
    flavor: c1.small
"#,
        )
        .unwrap();
        OpenStackCli::from_document(&doc)
    }

    fn attrs() -> CreateAttrs {
        CreateAttrs {
            label: "compute".to_string(),
            image: None,
            training: false,
            docker_ready: false,
            gpu_ready: false,
            volume: None,
        }
    }

    #[test]
    fn create_args_carry_boot_parameters() {
        let args = cli().build_create_args("vgcnbwc-compute-0000", "c1.small", &attrs(), None);
        let joined = args.join(" ");
        assert!(joined.starts_with("server create"));
        assert!(joined.contains("--image vggp-v60"));
        assert!(joined.contains("--flavor c1.small"));
        assert!(joined.contains("--key-name cloud2"));
        assert!(joined.contains("--nic net-id=galaxy-net"));
        assert!(joined.contains("--security-group ufr-ingress"));
        assert!(joined.contains("--security-group internal"));
        assert!(joined.ends_with("vgcnbwc-compute-0000"));
    }

    #[test]
    fn group_image_overrides_document_default() {
        let mut a = attrs();
        a.image = Some("vggp-gpu".to_string());
        let args = cli().build_create_args("n", "c1.small", &a, None);
        assert!(args.join(" ").contains("--image vggp-gpu"));
    }

    #[test]
    fn data_volume_maps_to_block_device() {
        let mut a = attrs();
        a.volume = Some(VolumeSpec {
            size_gb: 100,
            volume_type: "ssd".to_string(),
            boot: false,
        });
        let joined = cli().build_create_args("n", "c1.small", &a, None).join(" ");
        assert!(joined.contains("--block-device"));
        assert!(joined.contains("volume_size=100"));
        assert!(joined.contains("volume_type=ssd"));
    }

    #[test]
    fn boot_volume_uses_boot_from_volume() {
        let mut a = attrs();
        a.volume = Some(VolumeSpec {
            size_gb: 40,
            volume_type: "default".to_string(),
            boot: true,
        });
        let joined = cli().build_create_args("n", "c1.small", &a, None).join(" ");
        assert!(joined.contains("--boot-from-volume 40"));
        assert!(!joined.contains("--block-device"));
    }

    #[test]
    fn phase_mapping_covers_nova_states() {
        assert_eq!(phase_from_status("ACTIVE"), InstancePhase::Ready);
        assert_eq!(phase_from_status("BUILD"), InstancePhase::Booting);
        assert_eq!(phase_from_status("ERROR"), InstancePhase::Error);
        assert_eq!(phase_from_status("DELETED"), InstancePhase::Terminated);
        assert_eq!(phase_from_status("SHUTOFF"), InstancePhase::Error);
    }

    #[test]
    fn server_records_parse_and_map() {
        let json = r#"[
            {"ID": "abc", "Name": "vgcnbwc-compute-0001", "Status": "ACTIVE",
             "Image": "vggp-v60", "Flavor": "c1.small"},
            {"ID": "def", "Name": "jenkins-worker-17", "Status": "ACTIVE",
             "Image": "ubuntu", "Flavor": "m1.tiny"},
            {"ID": "ghi", "Name": "vgcnbwc-upload-0002", "Status": "BUILD",
             "Image": "N/A (booted from volume)", "Flavor": "c1.large"}
        ]"#;
        let records: Vec<ServerRecord> = serde_json::from_str(json).unwrap();
        let instances: Vec<Instance> = records
            .into_iter()
            .filter_map(|r| record_to_instance(r, "vgcnbwc"))
            .collect();

        // The foreign jenkins worker is not ours.
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].group, "compute");
        assert_eq!(instances[0].image.as_deref(), Some("vggp-v60"));
        assert_eq!(instances[1].group, "upload");
        assert_eq!(instances[1].image, None); // volume-booted
        assert_eq!(instances[1].phase, InstancePhase::Booting);
    }

}
