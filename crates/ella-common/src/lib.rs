//! Common types for the Ella Core charm: errors, logging setup, and Kubernetes helpers

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager recorded on every object this charm writes
pub const FIELD_MANAGER: &str = "charm";

/// Label key used to select the charm's workload pods
pub const APP_NAME_LABEL: &str = "app.kubernetes.io/name";
