//! Kubernetes resource provisioning
//!
//! The charm owns three kinds of cluster state around the workload:
//!
//! - Multus `NetworkAttachmentDefinition`s giving the pod its N2, N3 and N6
//!   interfaces ([`nad`])
//! - Patches to the Juju-managed StatefulSet: network annotation, privileged
//!   security context and the eBPF host mount ([`workload`])
//! - A LoadBalancer Service exposing N2 over SCTP ([`service`])
//!
//! Every operation is read-check-then-write. Objects that already exist are
//! left alone, and a create that loses a race with another writer counts as
//! success.
//!
//! Two trait seams keep this testable: [`ResourceProvisioner`] is what the
//! controller calls, [`KubeResources`] is the raw API surface the provisioning
//! logic runs against.

mod client;
pub mod nad;
pub mod service;
pub mod workload;

pub use client::KubeResourcesImpl;
pub use nad::{NetworkAttachment, NetworkAttachmentDefinition, NetworkAttachmentSpec};
pub use service::{ExternalService, ServicePortSpec};
pub use workload::{HostPathVolume, NetworkSelection, WorkloadNetworkPatch};

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Result of an ensure operation on a create-once object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The object was already present; nothing was written
    Existing,
    /// The object was created by this call
    Created,
}

/// Raw Kubernetes API calls in the unit's namespace
///
/// `get_*` maps a missing object to `Ok(None)`. `create_*` maps a name
/// collision to [`Error::AlreadyExists`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeResources: Send + Sync {
    /// Get a NetworkAttachmentDefinition by name
    async fn get_network_attachment(
        &self,
        name: &str,
    ) -> Result<Option<NetworkAttachmentDefinition>, Error>;

    /// Create a NetworkAttachmentDefinition
    async fn create_network_attachment(
        &self,
        nad: &NetworkAttachmentDefinition,
    ) -> Result<(), Error>;

    /// Get a StatefulSet by name
    async fn get_statefulset(&self, name: &str) -> Result<Option<StatefulSet>, Error>;

    /// Apply a strategic merge patch to a StatefulSet
    async fn patch_statefulset(&self, name: &str, patch: &serde_json::Value)
        -> Result<(), Error>;

    /// Replace a StatefulSet with a full object previously read
    async fn replace_statefulset(&self, statefulset: &StatefulSet) -> Result<(), Error>;

    /// Get a Service by name
    async fn get_service(&self, name: &str) -> Result<Option<Service>, Error>;

    /// Create a Service
    async fn create_service(&self, service: &Service) -> Result<(), Error>;
}

/// The provisioning operations the reconciliation pipeline runs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// Create the network attachment unless one with its name exists
    async fn ensure_network_attachment(
        &self,
        attachment: &NetworkAttachment,
    ) -> Result<EnsureOutcome, Error>;

    /// Patch the workload's network annotation and security context
    async fn patch_workload_network(&self, patch: &WorkloadNetworkPatch) -> Result<(), Error>;

    /// Append any missing host volumes and mounts to the workload
    ///
    /// Returns whether the StatefulSet was written.
    async fn ensure_workload_volumes(
        &self,
        statefulset: &str,
        container: &str,
        volumes: &[HostPathVolume],
    ) -> Result<bool, Error>;

    /// Create the external Service unless one with its name exists
    async fn ensure_external_service(
        &self,
        service: &ExternalService,
    ) -> Result<EnsureOutcome, Error>;
}

/// [`ResourceProvisioner`] running against a [`KubeResources`] implementation
pub struct KubeProvisioner {
    kube: Arc<dyn KubeResources>,
}

impl KubeProvisioner {
    /// Create a provisioner over the given API surface
    pub fn new(kube: Arc<dyn KubeResources>) -> Self {
        Self { kube }
    }
}

#[async_trait]
impl ResourceProvisioner for KubeProvisioner {
    async fn ensure_network_attachment(
        &self,
        attachment: &NetworkAttachment,
    ) -> Result<EnsureOutcome, Error> {
        nad::ensure(self.kube.as_ref(), attachment).await
    }

    async fn patch_workload_network(&self, patch: &WorkloadNetworkPatch) -> Result<(), Error> {
        workload::patch_network(self.kube.as_ref(), patch).await
    }

    async fn ensure_workload_volumes(
        &self,
        statefulset: &str,
        container: &str,
        volumes: &[HostPathVolume],
    ) -> Result<bool, Error> {
        workload::ensure_volumes(self.kube.as_ref(), statefulset, container, volumes).await
    }

    async fn ensure_external_service(
        &self,
        service: &ExternalService,
    ) -> Result<EnsureOutcome, Error> {
        service::ensure(self.kube.as_ref(), service).await
    }
}

/// Treat a lost create race as an existing object
pub(crate) fn created_or_existing(result: Result<(), Error>) -> Result<EnsureOutcome, Error> {
    match result {
        Ok(()) => Ok(EnsureOutcome::Created),
        Err(e) if e.is_already_exists() => Ok(EnsureOutcome::Existing),
        Err(e) => Err(e),
    }
}
