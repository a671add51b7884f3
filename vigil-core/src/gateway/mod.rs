//! Transport gateway trait and implementations
//!
//! Abstracts the scan service's HTTP surface so the tracker can be driven by
//! a real client or by a scripted double.

mod client;
pub mod routes;

pub use client::ApiClient;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vigil_model::{
    ApiInfo, HealthStatus, ScanCreated, ScanId, ScanSnapshot, StartScanRequest,
};

use crate::error::{GatewayError, GatewayResult};

/// Default service address used when nothing is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Request timeout applied to every call unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Service root, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Per-request timeout in milliseconds. Timed-out calls surface as
    /// [`GatewayError::Network`].
    pub request_timeout_ms: u64,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Operations the client needs from the scan service.
#[async_trait]
pub trait ScanGateway: Send + Sync + Debug {
    /// Create a scan job (`POST /api/scans/start`).
    async fn create_scan(
        &self,
        request: &StartScanRequest,
    ) -> GatewayResult<ScanCreated>;

    /// Fetch the current snapshot of a scan (`GET /api/scans/{id}`).
    async fn get_scan(&self, id: &ScanId) -> GatewayResult<ScanSnapshot>;

    /// List all scans in the order the service returns them.
    async fn list_scans(&self) -> GatewayResult<Vec<ScanSnapshot>>;

    /// Delete a scan record.
    async fn delete_scan(&self, id: &ScanId) -> GatewayResult<()>;

    /// Full health payload (`GET /health`).
    async fn health(&self) -> GatewayResult<HealthStatus>;

    /// Liveness probe.
    async fn check_health(&self) -> GatewayResult<bool> {
        Ok(self.health().await?.is_healthy())
    }

    /// Service identity and advertised endpoints (`GET /`).
    async fn api_info(&self) -> GatewayResult<ApiInfo>;

    /// Service root this gateway talks to.
    fn base_url(&self) -> &str;
}

/// Result of a delete that tolerates the record already being gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyGone,
}

/// Delete a scan, treating "not found" as success.
pub async fn delete_idempotent(
    gateway: &dyn ScanGateway,
    id: &ScanId,
) -> GatewayResult<DeleteOutcome> {
    match gateway.delete_scan(id).await {
        Ok(()) => Ok(DeleteOutcome::Deleted),
        Err(GatewayError::NotFound(_)) => {
            tracing::debug!(scan_id = %id, "delete of unknown scan treated as done");
            Ok(DeleteOutcome::AlreadyGone)
        }
        Err(err) => Err(err),
    }
}
