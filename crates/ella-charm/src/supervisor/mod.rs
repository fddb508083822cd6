//! Pebble process supervisor
//!
//! Ella Core runs under Pebble inside the `core` container. Configuring it
//! takes three calls: push the rendered `core.yaml`, add the service layer and
//! start the service. Pebble restarts the service itself if it exits, so the
//! charm never waits on the start change.

mod layer;
mod pebble;
mod render;

pub use layer::{Layer, Override, ServiceConfig, Startup, LAYER_LABEL};
pub use pebble::PebbleClient;
pub use render::CoreConfig;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

#[cfg(test)]
use mockall::automock;

use crate::config::DesiredConfig;
use crate::{Error, CONFIG_PATH, CONTAINER_NAME};

/// Pebble daemon identity returned by the system-info endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SystemInfo {
    /// Pebble version
    #[serde(default)]
    pub version: String,
}

/// Operations on the workload container's Pebble daemon
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Query the daemon; an error means it is not reachable yet
    async fn system_info(&self) -> Result<SystemInfo, Error>;

    /// Write a file into the container, creating parent directories
    async fn push(&self, path: &str, content: &[u8]) -> Result<(), Error>;

    /// Add (or combine into) the layer with `label`
    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<(), Error>;

    /// Start services by name
    async fn start(&self, services: &[String]) -> Result<(), Error>;
}

/// Push the config file, add the service layer and start Ella Core
pub async fn configure(supervisor: &dyn Supervisor, config: &DesiredConfig) -> Result<(), Error> {
    let rendered = CoreConfig::from_desired(config).to_yaml()?;
    supervisor
        .push(CONFIG_PATH, rendered.as_bytes())
        .await
        .map_err(|e| e.in_step("push config file"))?;
    info!(path = CONFIG_PATH, "pushed config file");

    supervisor
        .add_layer(LAYER_LABEL, &Layer::ella_core(), true)
        .await
        .map_err(|e| e.in_step("add pebble layer"))?;
    info!(label = LAYER_LABEL, "added pebble layer");

    supervisor
        .start(&[CONTAINER_NAME.to_string()])
        .await
        .map_err(|e| e.in_step("start service"))?;
    info!(service = CONTAINER_NAME, "started service");

    Ok(())
}
