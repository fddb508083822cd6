//! Juju host runtime
//!
//! Everything the charm learns from or reports to Juju goes through
//! [`HostRuntime`]: leadership, charm config, unit status, opened ports and
//! secrets. Production uses [`HookTools`], which shells out to the hook tools
//! Juju places on `PATH` for the duration of a hook.

mod hook_tools;

pub use hook_tools::{CommandOutput, HookTools, ProcessRunner, ToolRunner};

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::status::StatusName;
use crate::Error;

/// A TCP port the unit declares open
///
/// Only the API port is opened through Juju; N2 traffic reaches the unit
/// through the external SCTP Service instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port {
    /// Port number
    pub number: u16,
}

impl Port {
    /// A TCP port
    pub fn tcp(number: u16) -> Self {
        Self { number }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/tcp", self.number)
    }
}

/// Host runtime operations used by the reconciliation pipeline
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HostRuntime: Send + Sync {
    /// Whether this unit is the application leader
    async fn is_leader(&self) -> Result<bool, Error>;

    /// Raw charm config; unset keys are absent
    async fn config(&self) -> Result<BTreeMap<String, String>, Error>;

    /// Set the unit's workload status
    async fn set_status(&self, status: StatusName, message: &str) -> Result<(), Error>;

    /// Make `ports` the exact set of opened ports, closing any others
    async fn set_ports(&self, ports: &[Port]) -> Result<(), Error>;

    /// Create a secret owned by the application, returning its ID
    async fn add_secret(
        &self,
        label: &str,
        content: &BTreeMap<String, String>,
    ) -> Result<String, Error>;
}
