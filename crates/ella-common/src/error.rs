//! Error types for the Ella Core charm
//!
//! Errors are structured with fields to aid debugging from the unit's debug log.
//! Each variant names the collaborator that failed (Kubernetes, the Pebble
//! supervisor, the Ella Core API, the Juju host runtime) and the operation that
//! was being attempted. The reconciliation pipeline wraps failures in
//! [`Error::Step`] so the failing pipeline step is always visible.

use thiserror::Error;

/// Main error type for charm operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Object creation raced with another writer and the object now exists
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Resource kind (e.g., "Service")
        kind: String,
        /// Resource name
        name: String,
    },

    /// An object the charm depends on does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind (e.g., "StatefulSet", "container")
        kind: String,
        /// Resource name
        name: String,
    },

    /// Invalid configuration or request
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The offending setting (e.g., "unit-name")
        field: String,
    },

    /// Pebble process supervisor error
    #[error("supervisor error [{operation}]: {message}")]
    Supervisor {
        /// Supervisor operation that failed (e.g., "push", "add-layer")
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// Ella Core HTTP API error
    #[error("application API error [{operation}]: {message}")]
    Application {
        /// API operation that failed (e.g., "status", "create-user")
        operation: String,
        /// Description of what failed
        message: String,
        /// HTTP status code, when the server answered
        status: Option<u16>,
    },

    /// Juju hook tool error
    #[error("host runtime error [{command}]: {message}")]
    HostRuntime {
        /// Hook tool that failed (e.g., "secret-add")
        command: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The document kind being serialized
        kind: String,
    },

    /// A named reconciliation step failed
    #[error("{step}: {source}")]
    Step {
        /// Pipeline step that failed (e.g., "push config file")
        step: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an already-exists error for a resource
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a not-found error for a resource
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a validation error for a specific setting
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: field.into(),
        }
    }

    /// Create a supervisor error for an operation
    pub fn supervisor(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Supervisor {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create an application API error for an operation
    pub fn application(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Application {
            operation: operation.into(),
            message: msg.into(),
            status: None,
        }
    }

    /// Create an application API error carrying the HTTP status the server returned
    pub fn application_status(
        operation: impl Into<String>,
        status: u16,
        msg: impl Into<String>,
    ) -> Self {
        Self::Application {
            operation: operation.into(),
            message: msg.into(),
            status: Some(status),
        }
    }

    /// Create a host runtime error for a hook tool
    pub fn host_runtime(command: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::HostRuntime {
            command: command.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with document kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: kind.into(),
        }
    }

    /// Wrap this error with the name of the pipeline step that produced it
    ///
    /// Already-wrapped errors keep their innermost step name.
    pub fn in_step(self, step: impl Into<String>) -> Self {
        match self {
            Error::Step { .. } => self,
            other => Error::Step {
                step: step.into(),
                source: Box::new(other),
            },
        }
    }

    /// Get the pipeline step name if this error was raised inside a step
    pub fn step(&self) -> Option<&str> {
        match self {
            Error::Step { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Get the underlying error, unwrapping any step context
    pub fn root(&self) -> &Error {
        match self {
            Error::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if a create call lost a race to another writer
    pub fn is_already_exists(&self) -> bool {
        match self.root() {
            Error::AlreadyExists { .. } => true,
            Error::Kube { source } => crate::kube_utils::is_already_exists(source),
            _ => false,
        }
    }

    /// Check if the error reports a missing object
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Error::NotFound { .. } => true,
            Error::Kube { source } => crate::kube_utils::is_not_found(source),
            _ => false,
        }
    }

    /// Check if this error is expected to clear on a later hook invocation
    ///
    /// Validation and serialization errors need a config or code change.
    /// Missing objects and 4xx Kubernetes responses need operator attention.
    /// Everything else is infrastructure that may recover on its own.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            Error::Kube { source } => {
                crate::kube_utils::is_conflict(source)
                    || !matches!(
                        source,
                        kube::Error::Api(ae) if (400..500).contains(&ae.code)
                    )
            }
            Error::AlreadyExists { .. } => true,
            Error::NotFound { .. } => false,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Application { status, .. } => !matches!(status, Some(400..=499)),
            Error::Supervisor { .. } => true,
            Error::HostRuntime { .. } => true,
            Error::Step { .. } => true,
        }
    }
}
