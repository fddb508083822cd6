//! Ella Core charm - reconciliation pipeline for the Ella Core 5G network function
//!
//! Every Juju hook runs one pass of the pipeline. The pass drives the
//! `core` workload and its cluster resources toward the configured state and
//! reports a single unit status.
//!
//! # Pipeline
//!
//! Each gate short-circuits the run:
//!
//! 1. Leadership gate (non-leaders are `blocked`)
//! 2. Port declaration and config validation (bad config is `blocked`)
//! 3. Cluster resources: Multus network attachments, StatefulSet patches,
//!    the N2 load balancer Service
//! 4. Supervisor gate (unreachable Pebble is `waiting`)
//! 5. Config file, Pebble layer, service start
//! 6. Application gate (unreachable Ella Core API is `waiting`)
//! 7. First-run admin account bootstrap
//!
//! # Modules
//!
//! - [`context`] - Unit identity supplied by the host runtime
//! - [`config`] - Charm config validation
//! - [`status`] - Reconciliation outcomes and unit status names
//! - [`host`] - Juju host runtime (leadership, config, status, ports, secrets)
//! - [`cluster`] - Kubernetes resource provisioning
//! - [`supervisor`] - Pebble supervisor configuration
//! - [`core_api`] - Ella Core HTTP API client
//! - [`bootstrap`] - First-run admin credential bootstrap
//! - [`controller`] - The reconciliation pipeline

#![deny(missing_docs)]

pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod context;
pub mod controller;
pub mod core_api;
pub mod host;
pub mod status;
pub mod supervisor;

pub use ella_common::{Error, Result};

// =============================================================================
// Workload Constants
// =============================================================================
// Fixed values of the Ella Core workload. The config file, Pebble layer,
// Kubernetes objects and API client all refer to these.

/// Name of the workload container in the pod (and of the Pebble service)
pub const CONTAINER_NAME: &str = "core";

/// Path of the Ella Core config file inside the workload container
pub const CONFIG_PATH: &str = "/etc/core/core.yaml";

/// Path of the Ella Core database inside the workload container
pub const DB_PATH: &str = "/var/lib/core/core.db";

/// Port of the Ella Core HTTP API
pub const API_PORT: u16 = 2111;

/// SCTP port of the N2 (NGAP) interface
pub const N2_PORT: u16 = 38412;
