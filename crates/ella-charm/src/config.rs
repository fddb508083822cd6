//! Charm config validation
//!
//! Turns the raw `config-get` map into a [`DesiredConfig`]. Validation is
//! strict: every key is required and none is defaulted. Keys are checked in a
//! fixed order so the reported key is deterministic.

use std::collections::BTreeMap;

use thiserror::Error;

/// Config key for the Ella Core system log level
pub const LOGGING_LEVEL_KEY: &str = "logging-level";
/// Config key for the N2 interface address (CIDR)
pub const N2_IP_KEY: &str = "n2-ip";
/// Config key for the N3 interface address (CIDR)
pub const N3_IP_KEY: &str = "n3-ip";
/// Config key for the N6 interface address (CIDR)
pub const N6_IP_KEY: &str = "n6-ip";

/// A required config key is missing or empty
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0} is required")]
pub struct MissingConfig(pub &'static str);

impl MissingConfig {
    /// The config key that failed validation
    pub fn field(&self) -> &'static str {
        self.0
    }
}

/// Validated charm configuration for one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredConfig {
    /// Ella Core system log level
    pub logging_level: String,
    /// Static address of the N2 interface
    pub n2_address: String,
    /// Static address of the N3 interface
    pub n3_address: String,
    /// Static address of the N6 interface
    pub n6_address: String,
}

impl DesiredConfig {
    /// Validate a raw config map
    ///
    /// The first missing key, in the order logging-level, n2-ip, n3-ip,
    /// n6-ip, is reported.
    pub fn from_raw(raw: &BTreeMap<String, String>) -> Result<Self, MissingConfig> {
        Ok(Self {
            logging_level: required(raw, LOGGING_LEVEL_KEY)?,
            n2_address: required(raw, N2_IP_KEY)?,
            n3_address: required(raw, N3_IP_KEY)?,
            n6_address: required(raw, N6_IP_KEY)?,
        })
    }
}

fn required(raw: &BTreeMap<String, String>, key: &'static str) -> Result<String, MissingConfig> {
    match raw.get(key) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(MissingConfig(key)),
    }
}
