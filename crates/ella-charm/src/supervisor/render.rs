//! Ella Core config file rendering

use serde::Serialize;

use crate::config::DesiredConfig;
use crate::{Error, API_PORT, DB_PATH, N2_PORT};

/// XDP attach mode for the N3/N6 data path
pub const XDP_ATTACH_MODE: &str = "generic";

/// Interface serving the Ella Core API
pub const API_INTERFACE: &str = "lo";

/// Root of `core.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoreConfig {
    /// Logging settings
    pub logging: LoggingSection,
    /// Database settings
    pub db: DbSection,
    /// Network interface bindings
    pub interfaces: InterfacesSection,
    /// XDP settings
    pub xdp: XdpSection,
}

/// `logging` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggingSection {
    /// System log settings
    pub system: SystemLogging,
    /// Audit log settings
    pub audit: AuditLogging,
}

/// `logging.system` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemLogging {
    /// Log level
    pub level: String,
    /// Log destination
    pub output: String,
}

/// `logging.audit` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditLogging {
    /// Log destination
    pub output: String,
    /// Log file, when output is a file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// `db` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbSection {
    /// Database file path
    pub path: String,
}

/// `interfaces` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfacesSection {
    /// N2 (NGAP) interface
    pub n2: Interface,
    /// N3 (user plane, RAN side) interface
    pub n3: Interface,
    /// N6 (user plane, data network side) interface
    pub n6: Interface,
    /// HTTP API interface
    pub api: Interface,
}

/// One interface binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    /// Interface name inside the container
    pub name: String,
    /// Listening port, if the interface serves one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Interface {
    fn named(name: &str, port: Option<u16>) -> Self {
        Self {
            name: name.to_string(),
            port,
        }
    }
}

/// `xdp` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XdpSection {
    /// XDP program attach mode
    #[serde(rename = "attach-mode")]
    pub attach_mode: String,
}

impl CoreConfig {
    /// Desired Ella Core config for the validated charm config
    pub fn from_desired(config: &DesiredConfig) -> Self {
        Self {
            logging: LoggingSection {
                system: SystemLogging {
                    level: config.logging_level.clone(),
                    output: "stdout".to_string(),
                },
                audit: AuditLogging {
                    output: "stdout".to_string(),
                    path: None,
                },
            },
            db: DbSection {
                path: DB_PATH.to_string(),
            },
            interfaces: InterfacesSection {
                n2: Interface::named("n2", Some(N2_PORT)),
                n3: Interface::named("n3", None),
                n6: Interface::named("n6", None),
                api: Interface::named(API_INTERFACE, Some(API_PORT)),
            },
            xdp: XdpSection {
                attach_mode: XDP_ATTACH_MODE.to_string(),
            },
        }
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::serialization_for_kind("core config", e.to_string()))
    }
}
