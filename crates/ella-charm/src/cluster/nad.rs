//! Multus network attachments
//!
//! Each of the N2, N3 and N6 interfaces is a `NetworkAttachmentDefinition`
//! whose `spec.config` is a CNI bridge plugin config with a static address.
//! Attachments are created once and never updated; a changed address in the
//! charm config does not rewrite an existing attachment.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::workload::NetworkSelection;
use super::{created_or_existing, EnsureOutcome, KubeResources};
use crate::Error;

/// CNI spec version written into every attachment
pub const CNI_VERSION: &str = "0.3.1";

/// Multus network attachment definition
///
/// Only `spec.config` is used: a CNI plugin config encoded as a JSON string.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "k8s.cni.cncf.io",
    version = "v1",
    kind = "NetworkAttachmentDefinition",
    plural = "network-attachment-definitions",
    shortname = "net-attach-def",
    namespaced
)]
pub struct NetworkAttachmentSpec {
    /// CNI plugin config JSON
    pub config: String,
}

/// A workload network interface backed by a host bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    /// Attachment name (e.g., `core-n2`)
    pub name: String,
    /// Interface name inside the pod (e.g., `n2`)
    pub interface: String,
    /// Host bridge the interface is plugged into (e.g., `n2-br`)
    pub bridge: String,
    /// Static address in CIDR form
    pub address: String,
}

impl NetworkAttachment {
    /// Attachment for a named 3GPP interface using the standard naming
    pub fn for_interface(interface: &str, address: impl Into<String>) -> Self {
        Self {
            name: format!("core-{}", interface),
            interface: interface.to_string(),
            bridge: format!("{}-br", interface),
            address: address.into(),
        }
    }

    /// Entry for the pod's network selection annotation
    pub fn selection(&self) -> NetworkSelection {
        NetworkSelection {
            name: self.name.clone(),
            interface: self.interface.clone(),
        }
    }

    /// Render the bridge plugin config JSON
    pub fn cni_config(&self) -> Result<String, Error> {
        let config = CniConfig {
            cni_version: CNI_VERSION,
            ipam: Ipam {
                ipam_type: "static",
                addresses: vec![IpamAddress {
                    address: &self.address,
                }],
            },
            plugin_type: "bridge",
            bridge: &self.bridge,
            capabilities: Capabilities { mac: true },
        };
        serde_json::to_string(&config)
            .map_err(|e| Error::serialization_for_kind("CNI config", e.to_string()))
    }

    /// Build the Kubernetes object for this attachment
    pub fn to_resource(&self) -> Result<NetworkAttachmentDefinition, Error> {
        Ok(NetworkAttachmentDefinition::new(
            &self.name,
            NetworkAttachmentSpec {
                config: self.cni_config()?,
            },
        ))
    }
}

// Field order here is the order written to the API server
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CniConfig<'a> {
    cni_version: &'a str,
    ipam: Ipam<'a>,
    #[serde(rename = "type")]
    plugin_type: &'a str,
    bridge: &'a str,
    capabilities: Capabilities,
}

#[derive(Serialize)]
struct Ipam<'a> {
    #[serde(rename = "type")]
    ipam_type: &'a str,
    addresses: Vec<IpamAddress<'a>>,
}

#[derive(Serialize)]
struct IpamAddress<'a> {
    address: &'a str,
}

#[derive(Serialize)]
struct Capabilities {
    mac: bool,
}

/// Create the attachment unless one with the same name exists
pub(crate) async fn ensure(
    kube: &dyn KubeResources,
    attachment: &NetworkAttachment,
) -> Result<EnsureOutcome, Error> {
    if kube.get_network_attachment(&attachment.name).await?.is_some() {
        debug!(name = %attachment.name, "network attachment already exists");
        return Ok(EnsureOutcome::Existing);
    }

    let resource = attachment.to_resource()?;
    let outcome = created_or_existing(kube.create_network_attachment(&resource).await)?;
    match outcome {
        EnsureOutcome::Created => info!(
            name = %attachment.name,
            bridge = %attachment.bridge,
            address = %attachment.address,
            "created network attachment"
        ),
        EnsureOutcome::Existing => {
            debug!(name = %attachment.name, "network attachment created concurrently")
        }
    }
    Ok(outcome)
}
