//! core-k8s - Juju hook entry point for the Ella Core charm
//!
//! Juju runs this binary once per hook. It builds the collaborators, runs one
//! reconciliation pass and exits non-zero if the pass hit a fault, which makes
//! Juju mark the hook as failed and retry it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use kube::Client;
use tracing::{debug, info};

use ella_charm::cluster::{KubeProvisioner, KubeResourcesImpl};
use ella_charm::context::UnitContext;
use ella_charm::controller::{log_failure, reconcile, CharmContext};
use ella_charm::core_api::CoreClient;
use ella_charm::host::HookTools;
use ella_charm::supervisor::PebbleClient;
use ella_common::telemetry::{init_logging, LogFormat, LoggingConfig};

/// Ella Core charm - reconciles the Ella Core workload for one Juju hook
#[derive(Parser, Debug)]
#[command(name = "core-k8s", version, about, long_about = None)]
struct Cli {
    /// Juju unit name (`<app>/<number>`)
    #[arg(long, env = "JUJU_UNIT_NAME")]
    unit_name: String,

    /// Juju model name, also the Kubernetes namespace
    #[arg(long, env = "JUJU_MODEL_NAME")]
    model_name: String,

    /// Hook being dispatched, for log context only
    #[arg(long, env = "JUJU_DISPATCH_PATH")]
    dispatch_path: Option<String>,

    /// Pebble socket of the workload container
    #[arg(
        long,
        env = "ELLA_PEBBLE_SOCKET",
        default_value = "/charm/containers/core/pebble.socket"
    )]
    pebble_socket: PathBuf,

    /// Ella Core API base URL (defaults to the unit's in-cluster address)
    #[arg(long, env = "ELLA_CORE_API_URL")]
    core_api_url: Option<String>,

    /// Log output format (text or json)
    #[arg(long, env = "ELLA_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(LoggingConfig {
        format: cli.log_format,
        ..Default::default()
    })?;

    // Both kube and reqwest use rustls; keep whichever provider got there first
    if let Err(existing) = rustls::crypto::ring::default_provider().install_default() {
        debug!(?existing, "rustls crypto provider already installed");
    }

    let unit = UnitContext::new(&cli.unit_name, &cli.model_name)?;
    info!(
        unit = unit.unit_name(),
        hook = cli.dispatch_path.as_deref().unwrap_or("unknown"),
        "starting reconciliation"
    );

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let core_api = match &cli.core_api_url {
        Some(url) => CoreClient::new(url.as_str())?,
        None => CoreClient::for_unit(&unit)?,
    };

    let ctx = CharmContext {
        host: Arc::new(HookTools::new()),
        provisioner: Arc::new(KubeProvisioner::new(Arc::new(KubeResourcesImpl::new(
            client,
            unit.namespace(),
        )))),
        supervisor: Arc::new(PebbleClient::new(cli.pebble_socket)),
        core_api: Arc::new(core_api),
        unit,
    };

    match reconcile(&ctx).await {
        Ok(outcome) => {
            info!(outcome = %outcome, "hook complete");
            Ok(())
        }
        Err(e) => {
            log_failure(&e);
            Err(e.into())
        }
    }
}
