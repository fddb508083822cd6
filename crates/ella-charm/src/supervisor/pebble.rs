//! Pebble REST client over the daemon's unix socket
//!
//! Juju mounts each workload container's Pebble socket into the charm
//! container at `/charm/containers/<name>/pebble.socket`. Every call opens a
//! fresh HTTP/1 connection; hooks make only a handful of requests.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use tokio::net::UnixStream;
use tracing::debug;

use super::{Layer, Supervisor, SystemInfo};
use crate::Error;

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response envelope shared by every Pebble endpoint
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    response_type: String,
    #[serde(rename = "status-code", default)]
    status_code: u16,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    change: Option<String>,
}

impl Envelope {
    fn error_message(&self) -> Option<String> {
        if self.response_type != "error" {
            return None;
        }
        Some(
            self.result
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string(),
        )
    }
}

/// Per-file result of a push
#[derive(Debug, Deserialize)]
struct FileResult {
    path: String,
    #[serde(default)]
    error: Option<FileError>,
}

#[derive(Debug, Deserialize)]
struct FileError {
    message: String,
}

/// Pebble client bound to one container's socket
#[derive(Debug, Clone)]
pub struct PebbleClient {
    socket_path: PathBuf,
}

impl PebbleClient {
    /// Create a client for the socket at `socket_path`
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    async fn request(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<Envelope, Error> {
        tokio::time::timeout(
            REQUEST_TIMEOUT,
            self.send(operation, method, path, content_type, body),
        )
        .await
        .map_err(|_| {
            Error::supervisor(operation, format!("timed out after {:?}", REQUEST_TIMEOUT))
        })?
    }

    async fn send(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<Envelope, Error> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            Error::supervisor(
                operation,
                format!("cannot connect to {}: {}", self.socket_path.display(), e),
            )
        })?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| Error::supervisor(operation, format!("handshake failed: {}", e)))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "pebble connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, "localhost");
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        let request = builder
            .body(Full::new(body))
            .map_err(|e| Error::supervisor(operation, format!("invalid request: {}", e)))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| Error::supervisor(operation, format!("request failed: {}", e)))?;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::supervisor(operation, format!("reading response: {}", e)))?
            .to_bytes();

        let envelope: Envelope = serde_json::from_slice(&bytes).map_err(|e| {
            Error::supervisor(
                operation,
                format!("unparseable response (HTTP {}): {}", status, e),
            )
        })?;

        if let Some(message) = envelope.error_message() {
            return Err(Error::supervisor(operation, message));
        }
        if !status.is_success() {
            return Err(Error::supervisor(
                operation,
                format!("unexpected HTTP status {}", envelope.status_code),
            ));
        }
        Ok(envelope)
    }

    async fn post_json(
        &self,
        operation: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Envelope, Error> {
        let bytes = serde_json::to_vec(&body)
            .map_err(|e| Error::serialization_for_kind("pebble request", e.to_string()))?;
        self.request(
            operation,
            Method::POST,
            path,
            Some("application/json"),
            Bytes::from(bytes),
        )
        .await
    }
}

/// Build the multipart body for a single-file write
fn multipart_push_body(boundary: &str, path: &str, content: &[u8]) -> Result<Vec<u8>, Error> {
    let metadata = json!({
        "action": "write",
        "files": [{ "path": path, "make-dirs": true }],
    });
    let metadata = serde_json::to_string(&metadata)
        .map_err(|e| Error::serialization_for_kind("pebble push request", e.to_string()))?;

    let mut body = Vec::with_capacity(content.len() + metadata.len() + 512);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"request\"\r\n\
             Content-Type: application/json\r\n\r\n{m}\r\n",
            b = boundary,
            m = metadata
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{p}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            b = boundary,
            p = path
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    Ok(body)
}

#[async_trait]
impl Supervisor for PebbleClient {
    async fn system_info(&self) -> Result<SystemInfo, Error> {
        let envelope = self
            .request("system-info", Method::GET, "/v1/system-info", None, Bytes::new())
            .await?;
        serde_json::from_value(envelope.result)
            .map_err(|e| Error::supervisor("system-info", format!("unexpected result: {}", e)))
    }

    async fn push(&self, path: &str, content: &[u8]) -> Result<(), Error> {
        let boundary = uuid::Uuid::new_v4().simple().to_string();
        let body = multipart_push_body(&boundary, path, content)?;
        let content_type = format!("multipart/form-data; boundary={}", boundary);

        let envelope = self
            .request(
                "push",
                Method::POST,
                "/v1/files",
                Some(&content_type),
                Bytes::from(body),
            )
            .await?;

        let results: Vec<FileResult> = serde_json::from_value(envelope.result)
            .map_err(|e| Error::supervisor("push", format!("unexpected result: {}", e)))?;
        if let Some(failed) = results.into_iter().find(|r| r.error.is_some()) {
            let message = failed.error.map(|e| e.message).unwrap_or_default();
            return Err(Error::supervisor(
                "push",
                format!("{}: {}", failed.path, message),
            ));
        }
        debug!(path, bytes = content.len(), "pushed file");
        Ok(())
    }

    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<(), Error> {
        let body = json!({
            "action": "add",
            "combine": combine,
            "label": label,
            "format": "yaml",
            "layer": layer.to_yaml()?,
        });
        self.post_json("add-layer", "/v1/layers", body).await?;
        Ok(())
    }

    async fn start(&self, services: &[String]) -> Result<(), Error> {
        let body = json!({ "action": "start", "services": services });
        let envelope = self.post_json("start", "/v1/services", body).await?;
        debug!(?services, change = ?envelope.change, "start requested");
        Ok(())
    }
}
