//! Unit identity for one hook invocation
//!
//! Juju hands the charm its unit name (`<app>/<number>`) and model name
//! through the hook environment. Those are read once at startup into a
//! [`UnitContext`]; pipeline components receive only the derived values
//! they need (StatefulSet name, namespace, service name, API URL).

use ella_common::Error;

/// Identity of the unit running this hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitContext {
    unit_name: String,
    model_name: String,
}

impl UnitContext {
    /// Build a context from the Juju unit name and model name
    ///
    /// The unit name must have the form `<app>/<number>`.
    pub fn new(unit_name: impl Into<String>, model_name: impl Into<String>) -> Result<Self, Error> {
        let unit_name = unit_name.into();
        let model_name = model_name.into();

        let valid = match unit_name.rsplit_once('/') {
            Some((app, number)) => {
                !app.is_empty()
                    && !number.is_empty()
                    && number.chars().all(|c| c.is_ascii_digit())
            }
            None => false,
        };
        if !valid {
            return Err(Error::validation_for_field(
                "unit-name",
                format!("unit name '{}' is not of the form <app>/<number>", unit_name),
            ));
        }
        if model_name.is_empty() {
            return Err(Error::validation_for_field("model-name", "model name is empty"));
        }

        Ok(Self {
            unit_name,
            model_name,
        })
    }

    /// Full unit name (e.g., `core/0`)
    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// Model name, which is also the Kubernetes namespace
    pub fn namespace(&self) -> &str {
        &self.model_name
    }

    /// Application name (e.g., `core`), also the StatefulSet name
    pub fn app_name(&self) -> &str {
        self.split().0
    }

    /// Unit number within the application
    pub fn unit_number(&self) -> &str {
        self.split().1
    }

    /// Name of this unit's pod (e.g., `core-0`)
    pub fn pod_name(&self) -> String {
        format!("{}-{}", self.app_name(), self.unit_number())
    }

    /// Name of the load balancer Service exposing the N2 interface
    pub fn external_service_name(&self) -> String {
        format!("{}-external", self.app_name())
    }

    /// Stable in-cluster DNS name of this unit's pod
    ///
    /// Juju runs applications as StatefulSets governed by the
    /// `<app>-endpoints` headless Service.
    pub fn fqdn(&self) -> String {
        format!(
            "{}.{}-endpoints.{}.svc.cluster.local",
            self.pod_name(),
            self.app_name(),
            self.model_name
        )
    }

    fn split(&self) -> (&str, &str) {
        // validated in new()
        self.unit_name
            .rsplit_once('/')
            .unwrap_or((self.unit_name.as_str(), ""))
    }
}
