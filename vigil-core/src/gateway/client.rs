use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use vigil_model::{
    ApiInfo, HealthStatus, ScanCreated, ScanId, ScanSnapshot, StartScanRequest,
};

use super::{GatewayConfig, ScanGateway, routes};
use crate::error::{GatewayError, GatewayResult};

/// What a request is about; decides how 404 and 4xx statuses are classified.
#[derive(Debug, Clone, Copy)]
enum Call<'a> {
    Create,
    Scan(&'a ScanId),
    Listing,
    Probe,
}

/// HTTP client for the scan service.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    config: GatewayConfig,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("request_timeout_ms", &self.config.request_timeout_ms)
            .finish()
    }
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let base_url = normalize_base_url(&config.base_url);
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        info!(
            base_url = %base_url,
            timeout_ms = config.request_timeout_ms,
            "creating scan service client"
        );

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// Build an absolute URL for a service path
    pub fn build_url(&self, path: impl AsRef<str>) -> String {
        let path = path.as_ref().trim_start_matches('/');
        if path.is_empty() {
            format!("{}/", self.base_url)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.build_url(path);
        debug!(%method, %url, "api request");
        self.client.request(method, url)
    }

    /// Send a request and classify the response.
    ///
    /// Returns the raw body on success so callers decide whether to decode it.
    async fn send(
        &self,
        call: Call<'_>,
        request: RequestBuilder,
    ) -> GatewayResult<(StatusCode, Vec<u8>)> {
        let response = request.send().await.map_err(|err| {
            warn!(error = %err, "api transport failure");
            GatewayError::from_transport(err)
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(GatewayError::from_transport)?
            .to_vec();

        if status.is_success() {
            return Ok((status, body));
        }

        let detail = error_detail(&body);
        warn!(
            status = status.as_u16(),
            detail = detail.as_deref().unwrap_or(""),
            "api error response"
        );

        Err(match (status, call) {
            (StatusCode::NOT_FOUND, Call::Scan(id)) => {
                GatewayError::NotFound(id.to_string())
            }
            (StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY, Call::Create) => {
                GatewayError::Validation(
                    detail.unwrap_or_else(|| "target rejected".to_string()),
                )
            }
            _ => GatewayError::Service {
                status: status.as_u16(),
                message: detail.unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                }),
            },
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        call: Call<'_>,
        request: RequestBuilder,
    ) -> GatewayResult<T> {
        let (status, body) = self.send(call, request).await?;
        serde_json::from_slice(&body).map_err(|err| GatewayError::Service {
            status: status.as_u16(),
            message: format!("invalid response body: {err}"),
        })
    }
}

#[async_trait]
impl ScanGateway for ApiClient {
    async fn create_scan(
        &self,
        request: &StartScanRequest,
    ) -> GatewayResult<ScanCreated> {
        let builder = self.request(Method::POST, routes::START_SCAN).json(request);
        let created: ScanCreated = self.fetch(Call::Create, builder).await?;
        if created.scan_id.trim().is_empty() {
            return Err(GatewayError::Service {
                status: StatusCode::OK.as_u16(),
                message: "scan accepted without an id".to_string(),
            });
        }
        Ok(created)
    }

    async fn get_scan(&self, id: &ScanId) -> GatewayResult<ScanSnapshot> {
        let builder = self.request(Method::GET, &routes::scan(id));
        self.fetch(Call::Scan(id), builder).await
    }

    async fn list_scans(&self) -> GatewayResult<Vec<ScanSnapshot>> {
        let builder = self.request(Method::GET, routes::SCANS);
        self.fetch(Call::Listing, builder).await
    }

    async fn delete_scan(&self, id: &ScanId) -> GatewayResult<()> {
        let builder = self.request(Method::DELETE, &routes::scan(id));
        self.send(Call::Scan(id), builder).await.map(|_| ())
    }

    async fn health(&self) -> GatewayResult<HealthStatus> {
        let builder = self.request(Method::GET, routes::HEALTH);
        self.fetch(Call::Probe, builder).await
    }

    async fn api_info(&self) -> GatewayResult<ApiInfo> {
        let builder = self.request(Method::GET, routes::ROOT);
        self.fetch(Call::Probe, builder).await
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Normalize a configured base URL so we don't trip over missing schemes.
///
/// `localhost:8000` becomes `http://localhost:8000`; trailing slashes are
/// trimmed so joined paths never double up.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let with_scheme =
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };
    if with_scheme != raw {
        debug!(from = raw, to = %with_scheme, "normalized base URL");
    }
    with_scheme
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{"detail": "..."}`, `{"detail": [{"msg": "..."}]}` and
/// `{"message": "..."}`; falls back to short plain-text bodies.
fn error_detail(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        let detail = value.get("detail").or_else(|| value.get("message"));
        return match detail {
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(serde_json::Value::Array(items)) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                (!messages.is_empty()).then(|| messages.join("; "))
            }
            _ => None,
        };
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    (!text.is_empty() && text.len() <= 512).then(|| text.to_string())
}
