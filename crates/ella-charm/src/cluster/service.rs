//! External load balancer Service for the N2 interface
//!
//! gNodeBs reach Ella Core over SCTP on the N2 port. Juju does not expose
//! SCTP, so the charm creates its own LoadBalancer Service selecting the
//! application's pods.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use kube::api::ObjectMeta;
use tracing::{debug, info};

use ella_common::APP_NAME_LABEL;

use super::{created_or_existing, EnsureOutcome, KubeResources};
use crate::Error;

/// Service type used for the external Service
pub const LOAD_BALANCER: &str = "LoadBalancer";

/// A single port exposed by the external Service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePortSpec {
    /// Port name (e.g., `ngapp`)
    pub name: String,
    /// Port number
    pub port: u16,
    /// Protocol as Kubernetes spells it (e.g., `SCTP`)
    pub protocol: String,
}

/// LoadBalancer Service selecting the application's pods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalService {
    /// Service name
    pub name: String,
    /// Value of the `app.kubernetes.io/name` selector
    pub app_name: String,
    /// Exposed port
    pub port: ServicePortSpec,
}

impl ExternalService {
    /// Build the Kubernetes object for this Service
    pub fn to_resource(&self) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                selector: Some(BTreeMap::from([(
                    APP_NAME_LABEL.to_string(),
                    self.app_name.clone(),
                )])),
                ports: Some(vec![ServicePort {
                    name: Some(self.port.name.clone()),
                    port: i32::from(self.port.port),
                    protocol: Some(self.port.protocol.clone()),
                    ..Default::default()
                }]),
                type_: Some(LOAD_BALANCER.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Create the Service unless one with the same name exists
pub(crate) async fn ensure(
    kube: &dyn KubeResources,
    service: &ExternalService,
) -> Result<EnsureOutcome, Error> {
    if kube.get_service(&service.name).await?.is_some() {
        debug!(name = %service.name, "external service already exists");
        return Ok(EnsureOutcome::Existing);
    }

    let outcome = created_or_existing(kube.create_service(&service.to_resource()).await)?;
    if outcome == EnsureOutcome::Created {
        info!(
            name = %service.name,
            port = service.port.port,
            protocol = %service.port.protocol,
            "created external service"
        );
    }
    Ok(outcome)
}
