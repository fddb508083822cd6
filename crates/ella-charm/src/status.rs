//! Reconciliation outcomes and unit status
//!
//! A pass either stops at a gate ([`Outcome::Blocked`], [`Outcome::Waiting`])
//! or runs to completion ([`Outcome::Active`]). Faults are not outcomes; they
//! are returned as errors and leave the unit status untouched.

use std::fmt;

/// Reported when the unit does not hold leadership
pub const NOT_LEADER: &str = "unit is not leader";
/// Reported while Pebble cannot be reached
pub const WAITING_FOR_SUPERVISOR: &str = "waiting for process supervisor to be ready";
/// Reported while the Ella Core API cannot be reached
pub const WAITING_FOR_APPLICATION: &str = "waiting to be able to access application API";
/// Reported when a pass completes
pub const READY: &str = "charm is ready";

/// Juju workload status names accepted by `status-set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusName {
    /// The unit is serving
    Active,
    /// The unit needs operator action
    Blocked,
    /// The unit is waiting on something outside its control
    Waiting,
}

impl StatusName {
    /// Name as passed to `status-set`
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusName::Active => "active",
            StatusName::Blocked => "blocked",
            StatusName::Waiting => "waiting",
        }
    }
}

impl fmt::Display for StatusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Operator action is required (not leader, invalid config)
    Blocked(String),
    /// A collaborator is not ready yet; a later hook will retry
    Waiting(String),
    /// Every step converged
    Active(String),
}

impl Outcome {
    /// Blocked outcome for a non-leader unit
    pub fn not_leader() -> Self {
        Outcome::Blocked(NOT_LEADER.to_string())
    }

    /// Blocked outcome for a config validation failure
    pub fn invalid_config(reason: impl fmt::Display) -> Self {
        Outcome::Blocked(format!("invalid config: {}", reason))
    }

    /// Waiting outcome while Pebble is unreachable
    pub fn waiting_for_supervisor() -> Self {
        Outcome::Waiting(WAITING_FOR_SUPERVISOR.to_string())
    }

    /// Waiting outcome while the Ella Core API is unreachable
    pub fn waiting_for_application() -> Self {
        Outcome::Waiting(WAITING_FOR_APPLICATION.to_string())
    }

    /// Active outcome for a completed pass
    pub fn ready() -> Self {
        Outcome::Active(READY.to_string())
    }

    /// Status name to report for this outcome
    pub fn status_name(&self) -> StatusName {
        match self {
            Outcome::Blocked(_) => StatusName::Blocked,
            Outcome::Waiting(_) => StatusName::Waiting,
            Outcome::Active(_) => StatusName::Active,
        }
    }

    /// Status message to report for this outcome
    pub fn message(&self) -> &str {
        match self {
            Outcome::Blocked(m) | Outcome::Waiting(m) | Outcome::Active(m) => m,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status_name(), self.message())
    }
}
