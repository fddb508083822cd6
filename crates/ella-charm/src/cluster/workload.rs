//! Patches to the Juju-managed workload StatefulSet
//!
//! Juju creates the StatefulSet; the charm layers on what Ella Core needs
//! from the host. A strategic merge patch attaches the Multus networks and
//! makes the container privileged with `NET_ADMIN`. Host volumes are added by
//! read-modify-replace since a merge patch cannot express "append if absent".

use k8s_openapi::api::core::v1::{HostPathVolumeSource, PodSpec, Volume, VolumeMount};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::KubeResources;
use crate::Error;

/// Pod annotation read by Multus to attach extra networks
pub const NETWORKS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks";

/// One entry of the Multus networks annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSelection {
    /// NetworkAttachmentDefinition name
    pub name: String,
    /// Interface name inside the pod
    pub interface: String,
}

/// Network and security settings merged into the workload pod template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadNetworkPatch {
    /// StatefulSet to patch
    pub statefulset: String,
    /// Container receiving the security context
    pub container: String,
    /// Networks to attach, in annotation order
    pub networks: Vec<NetworkSelection>,
    /// Capabilities to add to the container
    pub add_capabilities: Option<Vec<String>>,
    /// Whether the container runs privileged
    pub privileged: Option<bool>,
}

impl WorkloadNetworkPatch {
    /// Render the strategic merge patch body
    pub fn to_patch(&self) -> Result<serde_json::Value, Error> {
        let networks = serde_json::to_string(&self.networks)
            .map_err(|e| Error::serialization_for_kind("network annotation", e.to_string()))?;

        let mut security_context = serde_json::Map::new();
        if let Some(add) = &self.add_capabilities {
            security_context.insert("capabilities".to_string(), json!({ "add": add }));
        }
        if let Some(privileged) = self.privileged {
            security_context.insert("privileged".to_string(), json!(privileged));
        }

        let mut container = serde_json::Map::new();
        container.insert("name".to_string(), json!(self.container));
        if !security_context.is_empty() {
            container.insert(
                "securityContext".to_string(),
                serde_json::Value::Object(security_context),
            );
        }

        Ok(json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            NETWORKS_ANNOTATION: networks
                        }
                    },
                    "spec": {
                        "containers": [container]
                    }
                }
            }
        }))
    }
}

/// A hostPath volume mounted into the workload container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPathVolume {
    /// Volume name, also the mount name
    pub name: String,
    /// Path on the node
    pub host_path: String,
    /// Path inside the container
    pub mount_path: String,
}

impl HostPathVolume {
    /// Create a hostPath volume description
    pub fn new(
        name: impl Into<String>,
        host_path: impl Into<String>,
        mount_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host_path: host_path.into(),
            mount_path: mount_path.into(),
        }
    }

    fn volume(&self) -> Volume {
        Volume {
            name: self.name.clone(),
            host_path: Some(HostPathVolumeSource {
                path: self.host_path.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn mount(&self) -> VolumeMount {
        VolumeMount {
            name: self.name.clone(),
            mount_path: self.mount_path.clone(),
            ..Default::default()
        }
    }
}

pub(crate) async fn patch_network(
    kube: &dyn KubeResources,
    patch: &WorkloadNetworkPatch,
) -> Result<(), Error> {
    let body = patch.to_patch()?;
    kube.patch_statefulset(&patch.statefulset, &body).await?;
    info!(
        statefulset = %patch.statefulset,
        networks = patch.networks.len(),
        "patched workload network settings"
    );
    Ok(())
}

/// Append missing volumes and mounts, replacing the StatefulSet if any were added
pub(crate) async fn ensure_volumes(
    kube: &dyn KubeResources,
    statefulset: &str,
    container: &str,
    volumes: &[HostPathVolume],
) -> Result<bool, Error> {
    let mut sts = kube
        .get_statefulset(statefulset)
        .await?
        .ok_or_else(|| Error::not_found("StatefulSet", statefulset))?;

    let pod_spec = sts
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .ok_or_else(|| Error::not_found("pod template", statefulset))?;

    let added = append_missing(pod_spec, container, volumes)?;
    if added == 0 {
        debug!(statefulset, "workload volumes already present");
        return Ok(false);
    }

    kube.replace_statefulset(&sts).await?;
    info!(statefulset, added, "added workload volumes");
    Ok(true)
}

/// Returns the number of volumes and mounts added
fn append_missing(
    pod_spec: &mut PodSpec,
    container: &str,
    required: &[HostPathVolume],
) -> Result<usize, Error> {
    let target = pod_spec
        .containers
        .iter_mut()
        .find(|c| c.name == container)
        .ok_or_else(|| Error::not_found("container", container))?;

    let mut added = 0;

    let mounts = target.volume_mounts.get_or_insert_with(Vec::new);
    for volume in required {
        if !mounts.iter().any(|m| m.name == volume.name) {
            mounts.push(volume.mount());
            added += 1;
        }
    }

    let pod_volumes = pod_spec.volumes.get_or_insert_with(Vec::new);
    for volume in required {
        if !pod_volumes.iter().any(|v| v.name == volume.name) {
            pod_volumes.push(volume.volume());
            added += 1;
        }
    }

    Ok(added)
}
