//! Ella Core HTTP API client
//!
//! The charm uses two endpoints: the unauthenticated status probe, and user
//! creation, which Ella Core accepts without a token until the first user
//! exists.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::context::UnitContext;
use crate::{Error, API_PORT};

/// Status endpoint path
pub const STATUS_PATH: &str = "/api/v1/status";
/// User collection endpoint path
pub const USERS_PATH: &str = "/api/v1/users";
/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Role ID Ella Core assigns to administrators
pub const ROLE_ADMIN: i64 = 1;

/// Result of the status probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CoreStatus {
    /// Whether the first user has been created
    pub initialized: bool,
    /// Ella Core version
    #[serde(default)]
    pub version: String,
}

/// Body of a user creation request
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct NewUser {
    /// Login email
    pub email: String,
    /// Login password
    pub password: String,
    /// Role to grant
    pub role_id: i64,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role_id", &self.role_id)
            .finish()
    }
}

/// Ella Core API operations used by the charm
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoreApi: Send + Sync {
    /// Probe the API; an error means it is not reachable yet
    async fn status(&self) -> Result<CoreStatus, Error>;

    /// Create a user
    async fn create_user(&self, user: &NewUser) -> Result<(), Error>;
}

/// Response envelope used by every Ella Core endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode an Ella Core response body
fn decode<T: DeserializeOwned>(operation: &str, status: StatusCode, body: &[u8]) -> Result<T, Error> {
    let envelope: Envelope<T> = serde_json::from_slice(body).map_err(|e| {
        Error::application_status(
            operation,
            status.as_u16(),
            format!("unparseable response: {}", e),
        )
    })?;

    if !status.is_success() {
        let message = envelope
            .error
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        return Err(Error::application_status(operation, status.as_u16(), message));
    }

    envelope
        .result
        .ok_or_else(|| Error::application_status(operation, status.as_u16(), "missing result"))
}

/// reqwest-backed [`CoreApi`]
pub struct CoreClient {
    http: reqwest::Client,
    base_url: String,
}

impl CoreClient {
    /// Create a client for the API at `base_url` (e.g., `http://core-0...:2111`)
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::application("client", e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a client for the API served by this unit's pod
    pub fn for_unit(unit: &UnitContext) -> Result<Self, Error> {
        Self::new(unit_base_url(unit))
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, Error> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::application(operation, e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::application_status(operation, status.as_u16(), e.to_string()))?;
        decode(operation, status, &body)
    }
}

/// API URL for a unit's pod, reachable through the headless endpoints Service
pub fn unit_base_url(unit: &UnitContext) -> String {
    format!("http://{}:{}", unit.fqdn(), API_PORT)
}

#[async_trait]
impl CoreApi for CoreClient {
    async fn status(&self) -> Result<CoreStatus, Error> {
        let url = format!("{}{}", self.base_url, STATUS_PATH);
        debug!(%url, "probing application status");
        self.send("status", self.http.get(url)).await
    }

    async fn create_user(&self, user: &NewUser) -> Result<(), Error> {
        let url = format!("{}{}", self.base_url, USERS_PATH);
        let _: serde_json::Value = self
            .send("create-user", self.http.post(url).json(user))
            .await?;
        Ok(())
    }
}
