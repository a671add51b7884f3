//! In-memory gateway double for deterministic tracker tests.
//!
//! [`ScriptedGateway`] replays queued responses per operation, optionally
//! after a delay, and counts every call it receives. Delays use
//! `tokio::time::sleep`, so tests on a paused clock stay instant.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use vigil_model::{
    ApiInfo, HealthStatus, ScanCreated, ScanId, ScanSnapshot, StartScanRequest,
};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::ScanGateway;

/// Calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: usize,
    pub get: usize,
    pub list: usize,
    pub delete: usize,
    pub health: usize,
    pub info: usize,
}

impl CallCounts {
    /// Calls that touched scan jobs.
    pub fn network_total(&self) -> usize {
        self.create + self.get + self.list + self.delete
    }
}

#[derive(Debug, Clone)]
struct Scripted<T> {
    result: GatewayResult<T>,
    delay: Duration,
}

#[derive(Debug)]
struct InnerState {
    creates: VecDeque<Scripted<ScanCreated>>,
    polls: VecDeque<Scripted<ScanSnapshot>>,
    last_poll: Option<Scripted<ScanSnapshot>>,
    deletes: VecDeque<GatewayResult<()>>,
    scans: Vec<ScanSnapshot>,
    health: GatewayResult<HealthStatus>,
    info: ApiInfo,
    calls: CallCounts,
    requests: Vec<StartScanRequest>,
}

/// Gateway that answers from scripts instead of the network.
///
/// Poll responses are consumed in order; once the queue is empty the last
/// one is repeated. Deletes without a scripted result remove the scan from
/// the listing or report `NotFound`.
#[derive(Debug, Clone)]
pub struct ScriptedGateway {
    inner: Arc<RwLock<InnerState>>,
    base_url: Arc<str>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new("http://scripted.invalid")
    }
}

impl ScriptedGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(InnerState {
                creates: VecDeque::new(),
                polls: VecDeque::new(),
                last_poll: None,
                deletes: VecDeque::new(),
                scans: Vec::new(),
                health: Ok(HealthStatus {
                    status: "healthy".into(),
                    timestamp: None,
                }),
                info: ApiInfo::default(),
                calls: CallCounts::default(),
                requests: Vec::new(),
            })),
            base_url: Arc::from(base_url.into()),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut InnerState) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn push_create(&self, result: GatewayResult<ScanCreated>) -> &Self {
        self.push_create_delayed(result, Duration::ZERO)
    }

    pub fn push_create_delayed(
        &self,
        result: GatewayResult<ScanCreated>,
        delay: Duration,
    ) -> &Self {
        self.with_state(|s| s.creates.push_back(Scripted { result, delay }));
        self
    }

    pub fn push_poll(&self, result: GatewayResult<ScanSnapshot>) -> &Self {
        self.push_poll_delayed(result, Duration::ZERO)
    }

    pub fn push_poll_delayed(
        &self,
        result: GatewayResult<ScanSnapshot>,
        delay: Duration,
    ) -> &Self {
        self.with_state(|s| s.polls.push_back(Scripted { result, delay }));
        self
    }

    /// Queue a sequence of successful poll responses.
    pub fn push_polls(
        &self,
        snapshots: impl IntoIterator<Item = ScanSnapshot>,
    ) -> &Self {
        for snapshot in snapshots {
            self.push_poll(Ok(snapshot));
        }
        self
    }

    pub fn push_delete(&self, result: GatewayResult<()>) -> &Self {
        self.with_state(|s| s.deletes.push_back(result));
        self
    }

    pub fn set_scans(&self, scans: Vec<ScanSnapshot>) -> &Self {
        self.with_state(|s| s.scans = scans);
        self
    }

    pub fn set_health(&self, health: GatewayResult<HealthStatus>) -> &Self {
        self.with_state(|s| s.health = health);
        self
    }

    pub fn set_info(&self, info: ApiInfo) -> &Self {
        self.with_state(|s| s.info = info);
        self
    }

    pub fn calls(&self) -> CallCounts {
        self.with_state(|s| s.calls)
    }

    /// Bodies received by `create_scan`, in call order.
    pub fn create_requests(&self) -> Vec<StartScanRequest> {
        self.with_state(|s| s.requests.clone())
    }
}

#[async_trait]
impl ScanGateway for ScriptedGateway {
    async fn create_scan(
        &self,
        request: &StartScanRequest,
    ) -> GatewayResult<ScanCreated> {
        let scripted = self.with_state(|s| {
            s.calls.create += 1;
            s.requests.push(request.clone());
            s.creates.pop_front()
        });
        let Some(Scripted { result, delay }) = scripted else {
            return Err(GatewayError::Service {
                status: 500,
                message: "no scripted create response".into(),
            });
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn get_scan(&self, id: &ScanId) -> GatewayResult<ScanSnapshot> {
        let scripted = self.with_state(|s| {
            s.calls.get += 1;
            match s.polls.pop_front() {
                Some(next) => {
                    s.last_poll = Some(next.clone());
                    Some(next)
                }
                None => s.last_poll.clone(),
            }
        });
        let Some(Scripted { result, delay }) = scripted else {
            return Err(GatewayError::NotFound(id.to_string()));
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn list_scans(&self) -> GatewayResult<Vec<ScanSnapshot>> {
        Ok(self.with_state(|s| {
            s.calls.list += 1;
            s.scans.clone()
        }))
    }

    async fn delete_scan(&self, id: &ScanId) -> GatewayResult<()> {
        self.with_state(|s| {
            s.calls.delete += 1;
            if let Some(result) = s.deletes.pop_front() {
                return result;
            }
            let before = s.scans.len();
            s.scans.retain(|scan| scan.scan_id != id.as_str());
            if s.scans.len() < before {
                Ok(())
            } else {
                Err(GatewayError::NotFound(id.to_string()))
            }
        })
    }

    async fn health(&self) -> GatewayResult<HealthStatus> {
        self.with_state(|s| {
            s.calls.health += 1;
            s.health.clone()
        })
    }

    async fn api_info(&self) -> GatewayResult<ApiInfo> {
        Ok(self.with_state(|s| {
            s.calls.info += 1;
            s.info.clone()
        }))
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// A `create_scan` response accepting the job under `id`.
pub fn created(id: &str) -> ScanCreated {
    ScanCreated {
        scan_id: id.to_string(),
        status: "queued".into(),
        message: Some("Scan started successfully".into()),
    }
}

/// A minimal poll response.
pub fn snapshot(id: &str, status: &str, progress: i64) -> ScanSnapshot {
    ScanSnapshot {
        scan_id: id.to_string(),
        target_url: "http://localhost:5001".into(),
        status: status.to_string(),
        progress,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_poll_repeats_once_script_runs_out() {
        let gateway = ScriptedGateway::default();
        gateway.push_polls([snapshot("abc123", "crawling", 10)]);
        let id = ScanId::new("abc123").unwrap();

        for _ in 0..3 {
            let snap = gateway.get_scan(&id).await.unwrap();
            assert_eq!(snap.status, "crawling");
        }
        assert_eq!(gateway.calls().get, 3);
    }

    #[tokio::test]
    async fn delete_falls_back_to_listing() {
        let gateway = ScriptedGateway::default();
        gateway.set_scans(vec![snapshot("abc123", "completed", 100)]);
        let id = ScanId::new("abc123").unwrap();

        assert_eq!(gateway.delete_scan(&id).await, Ok(()));
        assert_eq!(
            gateway.delete_scan(&id).await,
            Err(GatewayError::NotFound("abc123".into()))
        );
        assert!(gateway.list_scans().await.unwrap().is_empty());
    }
}
