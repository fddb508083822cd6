//! Pebble layer describing the Ella Core service

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, CONFIG_PATH, CONTAINER_NAME};

/// Label the layer is added under
pub const LAYER_LABEL: &str = "core";

/// A Pebble configuration layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Short description
    pub summary: String,
    /// Long description
    pub description: String,
    /// Services keyed by name
    pub services: BTreeMap<String, ServiceConfig>,
}

/// One service entry of a layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// How this entry merges with earlier layers (`merge` or `replace`)
    #[serde(rename = "override")]
    pub override_: Override,
    /// Short description
    pub summary: String,
    /// Command line run by Pebble
    pub command: String,
    /// Whether Pebble starts the service on boot
    pub startup: Startup,
}

/// Layer merge strategy for a service entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    /// Merge fields into the existing entry
    Merge,
    /// Replace the existing entry
    Replace,
}

/// Service startup mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Startup {
    /// Started automatically
    Enabled,
    /// Only started on request
    Disabled,
}

impl Layer {
    /// Layer running Ella Core against the pushed config file
    pub fn ella_core() -> Self {
        let service = ServiceConfig {
            override_: Override::Replace,
            summary: "Ella Core Service".to_string(),
            command: format!("core --config {}", CONFIG_PATH),
            startup: Startup::Enabled,
        };
        Self {
            summary: "Ella Core layer".to_string(),
            description: "pebble config layer for Ella Core".to_string(),
            services: BTreeMap::from([(CONTAINER_NAME.to_string(), service)]),
        }
    }

    /// Serialize to YAML as sent to Pebble
    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::serialization_for_kind("pebble layer", e.to_string()))
    }
}
