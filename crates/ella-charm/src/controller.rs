//! Reconciliation pipeline
//!
//! One call to [`reconcile`] is one hook's worth of work. Gates run in a fixed
//! order and the first unmet one decides the outcome:
//!
//! | Gate                       | Outcome when unmet                                  |
//! |----------------------------|-----------------------------------------------------|
//! | leadership                 | blocked: unit is not leader                         |
//! | charm config               | blocked: invalid config: `<key>` is required        |
//! | Pebble reachable           | waiting: waiting for process supervisor to be ready |
//! | Ella Core API reachable    | waiting: waiting to be able to access application API |
//!
//! Failures anywhere else are faults: they are returned with the failing step
//! named, and the unit status is left as it was.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::bootstrap::{self, BootstrapOutcome};
use crate::cluster::{
    EnsureOutcome, ExternalService, HostPathVolume, NetworkAttachment, ResourceProvisioner,
    ServicePortSpec, WorkloadNetworkPatch,
};
use crate::config::DesiredConfig;
use crate::context::UnitContext;
use crate::core_api::CoreApi;
use crate::host::{HostRuntime, Port};
use crate::status::Outcome;
use crate::supervisor::{self, Supervisor};
use crate::{Error, API_PORT, CONTAINER_NAME, N2_PORT};

/// Capabilities added to the workload container
pub const WORKLOAD_CAPABILITIES: &[&str] = &["NET_ADMIN"];

/// Port name of the N2 interface on the external Service
pub const N2_PORT_NAME: &str = "ngapp";

/// Collaborators for one reconciliation pass
pub struct CharmContext {
    /// Identity of the unit running the hook
    pub unit: UnitContext,
    /// Juju host runtime
    pub host: Arc<dyn HostRuntime>,
    /// Kubernetes resource provisioning
    pub provisioner: Arc<dyn ResourceProvisioner>,
    /// Pebble in the workload container
    pub supervisor: Arc<dyn Supervisor>,
    /// Ella Core API
    pub core_api: Arc<dyn CoreApi>,
}

/// Cluster state the charm converges toward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredResources {
    /// N2, N3 and N6 attachments, in that order
    pub attachments: Vec<NetworkAttachment>,
    /// Network annotation and security context for the workload
    pub network_patch: WorkloadNetworkPatch,
    /// Host volumes the workload container needs
    pub volumes: Vec<HostPathVolume>,
    /// Load balancer for the N2 interface
    pub external_service: ExternalService,
}

impl DesiredResources {
    /// Derive the desired cluster state for a unit and its config
    pub fn new(unit: &UnitContext, config: &DesiredConfig) -> Self {
        let attachments = vec![
            NetworkAttachment::for_interface("n2", config.n2_address.clone()),
            NetworkAttachment::for_interface("n3", config.n3_address.clone()),
            NetworkAttachment::for_interface("n6", config.n6_address.clone()),
        ];

        let network_patch = WorkloadNetworkPatch {
            statefulset: unit.app_name().to_string(),
            container: CONTAINER_NAME.to_string(),
            networks: attachments.iter().map(NetworkAttachment::selection).collect(),
            add_capabilities: Some(WORKLOAD_CAPABILITIES.iter().map(|c| c.to_string()).collect()),
            privileged: Some(true),
        };

        Self {
            attachments,
            network_patch,
            volumes: vec![HostPathVolume::new("ebpf", "/sys/fs/bpf", "/sys/fs/bpf")],
            external_service: ExternalService {
                name: unit.external_service_name(),
                app_name: unit.app_name().to_string(),
                port: ServicePortSpec {
                    name: N2_PORT_NAME.to_string(),
                    port: N2_PORT,
                    protocol: "SCTP".to_string(),
                },
            },
        }
    }
}

/// Run one reconciliation pass and report its outcome as the unit status
#[instrument(skip(ctx), fields(unit = %ctx.unit.unit_name()))]
pub async fn reconcile(ctx: &CharmContext) -> Result<Outcome, Error> {
    let outcome = evaluate(ctx).await?;

    ctx.host
        .set_status(outcome.status_name(), outcome.message())
        .await
        .map_err(|e| e.in_step("set unit status"))?;
    info!(status = %outcome.status_name(), message = outcome.message(), "reconciliation complete");

    Ok(outcome)
}

async fn evaluate(ctx: &CharmContext) -> Result<Outcome, Error> {
    let leader = ctx
        .host
        .is_leader()
        .await
        .map_err(|e| e.in_step("check leadership"))?;
    if !leader {
        info!("unit is not leader, skipping reconciliation");
        return Ok(Outcome::not_leader());
    }

    ctx.host
        .set_ports(&[Port::tcp(API_PORT)])
        .await
        .map_err(|e| e.in_step("declare ports"))?;

    let raw = ctx
        .host
        .config()
        .await
        .map_err(|e| e.in_step("read config"))?;
    let config = match DesiredConfig::from_raw(&raw) {
        Ok(config) => config,
        Err(missing) => {
            warn!(field = missing.field(), "invalid charm config");
            return Ok(Outcome::invalid_config(missing));
        }
    };

    let desired = DesiredResources::new(&ctx.unit, &config);
    provision(ctx.provisioner.as_ref(), &desired).await?;

    if let Err(e) = ctx.supervisor.system_info().await {
        debug!(error = %e, "pebble is not reachable");
        return Ok(Outcome::waiting_for_supervisor());
    }

    supervisor::configure(ctx.supervisor.as_ref(), &config).await?;

    let status = match ctx.core_api.status().await {
        Ok(status) => status,
        Err(e) => {
            debug!(error = %e, "application API is not reachable");
            return Ok(Outcome::waiting_for_application());
        }
    };

    let bootstrap = bootstrap::ensure_admin(ctx.core_api.as_ref(), ctx.host.as_ref(), &status)
        .await
        .map_err(|e| e.in_step("bootstrap admin account"))?;
    if let BootstrapOutcome::AdminCreated { .. } = bootstrap {
        info!(version = %status.version, "application initialized");
    }

    Ok(Outcome::ready())
}

/// Converge cluster resources, stopping at the first failure
async fn provision(
    provisioner: &dyn ResourceProvisioner,
    desired: &DesiredResources,
) -> Result<(), Error> {
    for attachment in &desired.attachments {
        let outcome = provisioner
            .ensure_network_attachment(attachment)
            .await
            .map_err(|e| e.in_step(format!("ensure network attachment {}", attachment.name)))?;
        if outcome == EnsureOutcome::Created {
            debug!(name = %attachment.name, "network attachment created");
        }
    }

    provisioner
        .patch_workload_network(&desired.network_patch)
        .await
        .map_err(|e| e.in_step("patch workload network"))?;

    provisioner
        .ensure_workload_volumes(
            &desired.network_patch.statefulset,
            &desired.network_patch.container,
            &desired.volumes,
        )
        .await
        .map_err(|e| e.in_step("ensure workload volumes"))?;

    provisioner
        .ensure_external_service(&desired.external_service)
        .await
        .map_err(|e| e.in_step("ensure external service"))?;

    Ok(())
}

/// Log a failed pass with its step and cause
pub fn log_failure(err: &Error) {
    error!(
        step = err.step().unwrap_or("unknown"),
        error = %err,
        retryable = err.is_retryable(),
        "reconciliation failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockResourceProvisioner;
    use crate::config::{LOGGING_LEVEL_KEY, N2_IP_KEY, N3_IP_KEY, N6_IP_KEY};
    use crate::core_api::{CoreStatus, MockCoreApi};
    use crate::host::MockHostRuntime;
    use crate::status::{StatusName, NOT_LEADER, READY, WAITING_FOR_APPLICATION, WAITING_FOR_SUPERVISOR};
    use crate::supervisor::{MockSupervisor, SystemInfo};
    use mockall::predicate::*;
    use mockall::Sequence;
    use std::collections::BTreeMap;

    // =========================================================================
    // Fixtures
    // =========================================================================

    fn unit() -> UnitContext {
        UnitContext::new("core/0", "ella").unwrap()
    }

    fn valid_config() -> BTreeMap<String, String> {
        [
            (LOGGING_LEVEL_KEY, "info"),
            (N2_IP_KEY, "192.168.252.3/24"),
            (N3_IP_KEY, "192.168.251.5/24"),
            (N6_IP_KEY, "192.168.250.3/24"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Host that is leader with `config`, expecting one final status
    fn leader_host(
        config: BTreeMap<String, String>,
        status: StatusName,
        message: &'static str,
    ) -> MockHostRuntime {
        let mut host = MockHostRuntime::new();
        host.expect_is_leader().returning(|| Ok(true));
        host.expect_set_ports()
            .withf(|ports| ports == [Port::tcp(2111)])
            .returning(|_| Ok(()));
        host.expect_config().returning(move || Ok(config.clone()));
        host.expect_set_status()
            .with(eq(status), eq(message))
            .times(1)
            .returning(|_, _| Ok(()));
        host
    }

    fn converging_provisioner() -> MockResourceProvisioner {
        let mut provisioner = MockResourceProvisioner::new();
        provisioner
            .expect_ensure_network_attachment()
            .times(3)
            .returning(|_| Ok(EnsureOutcome::Existing));
        provisioner
            .expect_patch_workload_network()
            .times(1)
            .returning(|_| Ok(()));
        provisioner
            .expect_ensure_workload_volumes()
            .times(1)
            .returning(|_, _, _| Ok(false));
        provisioner
            .expect_ensure_external_service()
            .times(1)
            .returning(|_| Ok(EnsureOutcome::Existing));
        provisioner
    }

    fn ready_supervisor() -> MockSupervisor {
        let mut supervisor = MockSupervisor::new();
        supervisor
            .expect_system_info()
            .returning(|| Ok(SystemInfo::default()));
        supervisor.expect_push().times(1).returning(|_, _| Ok(()));
        supervisor
            .expect_add_layer()
            .times(1)
            .returning(|_, _, _| Ok(()));
        supervisor.expect_start().times(1).returning(|_| Ok(()));
        supervisor
    }

    fn unreachable_supervisor() -> MockSupervisor {
        let mut supervisor = MockSupervisor::new();
        supervisor
            .expect_system_info()
            .returning(|| Err(Error::supervisor("system-info", "connection refused")));
        supervisor.expect_push().never();
        supervisor.expect_add_layer().never();
        supervisor.expect_start().never();
        supervisor
    }

    fn core_api(initialized: bool) -> MockCoreApi {
        let mut api = MockCoreApi::new();
        api.expect_status().returning(move || {
            Ok(CoreStatus {
                initialized,
                version: "v0.4.0".to_string(),
            })
        });
        api
    }

    fn context(
        host: MockHostRuntime,
        provisioner: MockResourceProvisioner,
        supervisor: MockSupervisor,
        core_api: MockCoreApi,
    ) -> CharmContext {
        CharmContext {
            unit: unit(),
            host: Arc::new(host),
            provisioner: Arc::new(provisioner),
            supervisor: Arc::new(supervisor),
            core_api: Arc::new(core_api),
        }
    }

    // =========================================================================
    // Desired resources
    // =========================================================================

    #[test]
    fn test_desired_resources_follow_unit_and_config() {
        let config = DesiredConfig::from_raw(&valid_config()).unwrap();
        let desired = DesiredResources::new(&unit(), &config);

        let names: Vec<_> = desired.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["core-n2", "core-n3", "core-n6"]);
        assert_eq!(desired.attachments[1].address, "192.168.251.5/24");

        let patch = &desired.network_patch;
        assert_eq!(patch.statefulset, "core");
        assert_eq!(patch.container, "core");
        assert_eq!(patch.networks[2].interface, "n6");
        assert_eq!(patch.add_capabilities, Some(vec!["NET_ADMIN".to_string()]));
        assert_eq!(patch.privileged, Some(true));

        assert_eq!(desired.volumes[0].name, "ebpf");
        assert_eq!(desired.external_service.name, "core-external");
        assert_eq!(desired.external_service.port.port, 38412);
    }

    // =========================================================================
    // Gate stories
    // =========================================================================

    /// Story: a non-leader unit is blocked and touches nothing
    ///
    /// Config content does not matter; it is never read.
    #[tokio::test]
    async fn story_non_leader_is_blocked_without_side_effects() {
        let mut host = MockHostRuntime::new();
        host.expect_is_leader().returning(|| Ok(false));
        host.expect_set_ports().never();
        host.expect_config().never();
        host.expect_add_secret().never();
        host.expect_set_status()
            .with(eq(StatusName::Blocked), eq(NOT_LEADER))
            .times(1)
            .returning(|_, _| Ok(()));

        let ctx = context(
            host,
            MockResourceProvisioner::new(),
            MockSupervisor::new(),
            MockCoreApi::new(),
        );
        let outcome = reconcile(&ctx).await.unwrap();
        assert_eq!(outcome, Outcome::Blocked(NOT_LEADER.to_string()));
    }

    /// Story: each missing config key blocks the unit before provisioning
    #[tokio::test]
    async fn story_missing_config_key_blocks_before_provisioning() {
        let cases: [(&str, &'static str); 4] = [
            (LOGGING_LEVEL_KEY, "invalid config: logging-level is required"),
            (N2_IP_KEY, "invalid config: n2-ip is required"),
            (N3_IP_KEY, "invalid config: n3-ip is required"),
            (N6_IP_KEY, "invalid config: n6-ip is required"),
        ];

        for (key, message) in cases {
            let mut config = valid_config();
            config.remove(key);

            // No expectations: any provisioning, supervisor or API call panics
            let ctx = context(
                leader_host(config, StatusName::Blocked, message),
                MockResourceProvisioner::new(),
                MockSupervisor::new(),
                MockCoreApi::new(),
            );
            let outcome = reconcile(&ctx).await.unwrap();
            assert_eq!(outcome, Outcome::Blocked(message.to_string()));
        }
    }

    /// Story: Pebble is not up yet, so the unit waits and pushes nothing
    #[tokio::test]
    async fn story_unreachable_supervisor_waits_without_pushing_config() {
        let ctx = context(
            leader_host(valid_config(), StatusName::Waiting, WAITING_FOR_SUPERVISOR),
            converging_provisioner(),
            unreachable_supervisor(),
            MockCoreApi::new(),
        );

        let outcome = reconcile(&ctx).await.unwrap();
        assert_eq!(outcome, Outcome::waiting_for_supervisor());
    }

    /// Story: Ella Core is starting, so the unit waits and generates no credential
    #[tokio::test]
    async fn story_unreachable_application_waits_without_credentials() {
        let mut host = leader_host(valid_config(), StatusName::Waiting, WAITING_FOR_APPLICATION);
        host.expect_add_secret().never();

        let mut api = MockCoreApi::new();
        api.expect_status()
            .returning(|| Err(Error::application("status", "connection refused")));
        api.expect_create_user().never();

        let ctx = context(host, converging_provisioner(), ready_supervisor(), api);
        let outcome = reconcile(&ctx).await.unwrap();
        assert_eq!(outcome, Outcome::waiting_for_application());
    }

    /// Story: first boot of a fresh Ella Core
    ///
    /// Everything converges, the application reports uninitialized, and the
    /// charm stores exactly one secret before exactly one user creation.
    #[tokio::test]
    async fn story_first_boot_bootstraps_admin_and_goes_active() {
        let mut seq = Sequence::new();

        let mut host = leader_host(valid_config(), StatusName::Active, READY);
        host.expect_add_secret()
            .with(eq("ELLA_CORE_LOGIN"), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("secret:abc".to_string()));

        let mut api = core_api(false);
        api.expect_create_user()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let ctx = context(host, converging_provisioner(), ready_supervisor(), api);
        let outcome = reconcile(&ctx).await.unwrap();
        assert_eq!(outcome, Outcome::Active(READY.to_string()));
    }

    /// Story: later hooks on an initialized application create nothing
    #[tokio::test]
    async fn story_initialized_application_goes_active_without_bootstrap() {
        let mut host = leader_host(valid_config(), StatusName::Active, READY);
        host.expect_add_secret().never();

        let mut api = core_api(true);
        api.expect_create_user().never();

        let ctx = context(host, converging_provisioner(), ready_supervisor(), api);
        let outcome = reconcile(&ctx).await.unwrap();
        assert!(matches!(outcome, Outcome::Active(_)));
    }

    // =========================================================================
    // Fault stories
    // =========================================================================

    /// Story: provisioning runs n2, n3, n6, then the workload and service
    #[tokio::test]
    async fn story_provisioning_order() {
        let mut seq = Sequence::new();
        let mut provisioner = MockResourceProvisioner::new();
        for name in ["core-n2", "core-n3", "core-n6"] {
            provisioner
                .expect_ensure_network_attachment()
                .withf(move |a| a.name == name)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(EnsureOutcome::Created));
        }
        provisioner
            .expect_patch_workload_network()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        provisioner
            .expect_ensure_workload_volumes()
            .with(eq("core"), eq("core"), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(true));
        provisioner
            .expect_ensure_external_service()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(EnsureOutcome::Created));

        let config = DesiredConfig::from_raw(&valid_config()).unwrap();
        provision(&provisioner, &DesiredResources::new(&unit(), &config))
            .await
            .unwrap();
    }

    /// Story: a cluster fault mid-pipeline is returned and the status is untouched
    #[tokio::test]
    async fn story_provisioning_fault_leaves_status_unchanged() {
        let mut host = MockHostRuntime::new();
        host.expect_is_leader().returning(|| Ok(true));
        host.expect_set_ports().returning(|_| Ok(()));
        let config = valid_config();
        host.expect_config().returning(move || Ok(config.clone()));
        host.expect_set_status().never();

        let mut provisioner = MockResourceProvisioner::new();
        provisioner
            .expect_ensure_network_attachment()
            .returning(|_| Ok(EnsureOutcome::Existing));
        provisioner
            .expect_patch_workload_network()
            .returning(|_| Err(Error::not_found("StatefulSet", "core")));
        provisioner.expect_ensure_workload_volumes().never();
        provisioner.expect_ensure_external_service().never();

        let ctx = context(
            host,
            provisioner,
            MockSupervisor::new(),
            MockCoreApi::new(),
        );
        let err = reconcile(&ctx).await.unwrap_err();
        assert_eq!(err.step(), Some("patch workload network"));
        assert!(err.is_not_found());
    }

    /// Story: n6 cannot be created after n2 and n3 were
    ///
    /// The failing attachment is named, nothing already created is rolled
    /// back, and no later provisioning step runs.
    #[tokio::test]
    async fn story_partial_attachment_failure_stops_provisioning() {
        let mut host = MockHostRuntime::new();
        host.expect_is_leader().returning(|| Ok(true));
        host.expect_set_ports().returning(|_| Ok(()));
        let config = valid_config();
        host.expect_config().returning(move || Ok(config.clone()));
        host.expect_set_status().never();

        let mut seq = Sequence::new();
        let mut provisioner = MockResourceProvisioner::new();
        for name in ["core-n2", "core-n3"] {
            provisioner
                .expect_ensure_network_attachment()
                .withf(move |a| a.name == name)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(EnsureOutcome::Created));
        }
        provisioner
            .expect_ensure_network_attachment()
            .withf(|a| a.name == "core-n6")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(Error::from(kube::Error::Api(kube::core::ErrorResponse {
                    status: "Failure".to_string(),
                    message: "admission webhook denied the request".to_string(),
                    reason: "Forbidden".to_string(),
                    code: 403,
                })))
            });
        provisioner.expect_patch_workload_network().never();
        provisioner.expect_ensure_workload_volumes().never();
        provisioner.expect_ensure_external_service().never();

        let mut supervisor = MockSupervisor::new();
        supervisor.expect_system_info().never();

        let ctx = context(host, provisioner, supervisor, MockCoreApi::new());
        let err = reconcile(&ctx).await.unwrap_err();
        assert_eq!(err.step(), Some("ensure network attachment core-n6"));
        assert!(!err.is_retryable());
    }

    /// Story: the credential is stored but the account cannot be created
    ///
    /// The hook fails on the account step and leaves the status alone; the
    /// next hook sees an uninitialized application and bootstraps again.
    #[tokio::test]
    async fn story_user_creation_fault_after_secret_leaves_status_unchanged() {
        let mut host = MockHostRuntime::new();
        host.expect_is_leader().returning(|| Ok(true));
        host.expect_set_ports().returning(|_| Ok(()));
        let config = valid_config();
        host.expect_config().returning(move || Ok(config.clone()));
        host.expect_add_secret()
            .times(1)
            .returning(|_, _| Ok("secret:abc".to_string()));
        host.expect_set_status().never();

        let mut api = core_api(false);
        api.expect_create_user()
            .times(1)
            .returning(|_| {
                Err(Error::application_status(
                    "create-user",
                    500,
                    "database is locked",
                ))
            });

        let ctx = context(host, converging_provisioner(), ready_supervisor(), api);
        let err = reconcile(&ctx).await.unwrap_err();
        assert_eq!(err.step(), Some("create admin account"));
        assert!(err.is_retryable());
    }

    /// Story: failing to declare ports is a fault, not a status
    #[tokio::test]
    async fn story_port_declaration_fault_is_propagated() {
        let mut host = MockHostRuntime::new();
        host.expect_is_leader().returning(|| Ok(true));
        host.expect_set_ports()
            .returning(|_| Err(Error::host_runtime("open-port", "not permitted")));
        host.expect_config().never();
        host.expect_set_status().never();

        let ctx = context(
            host,
            MockResourceProvisioner::new(),
            MockSupervisor::new(),
            MockCoreApi::new(),
        );
        let err = reconcile(&ctx).await.unwrap_err();
        assert_eq!(err.step(), Some("declare ports"));
    }

    /// Story: a failed push after Pebble came up is a fault
    #[tokio::test]
    async fn story_supervisor_configure_fault_is_propagated() {
        let mut host = MockHostRuntime::new();
        host.expect_is_leader().returning(|| Ok(true));
        host.expect_set_ports().returning(|_| Ok(()));
        let config = valid_config();
        host.expect_config().returning(move || Ok(config.clone()));
        host.expect_set_status().never();

        let mut supervisor = MockSupervisor::new();
        supervisor
            .expect_system_info()
            .returning(|| Ok(SystemInfo::default()));
        supervisor
            .expect_push()
            .returning(|_, _| Err(Error::supervisor("push", "read-only file system")));

        let mut api = MockCoreApi::new();
        api.expect_status().never();

        let ctx = context(host, converging_provisioner(), supervisor, api);
        let err = reconcile(&ctx).await.unwrap_err();
        assert_eq!(err.step(), Some("push config file"));
    }
}
