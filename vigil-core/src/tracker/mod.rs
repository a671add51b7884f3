//! Scan lifecycle tracking.
//!
//! A [`ScanTracker`] owns at most one remote scan job at a time. It submits
//! the job, polls its status on a fixed cadence from a background task bound
//! to a lifetime [`CancellationToken`], and settles it into a
//! [`TerminalOutcome`] with an aggregated report.
//!
//! Observers read immutable [`TrackerStatus`] snapshots through a `watch`
//! channel and receive [`TrackerEvent`]s through a `broadcast` channel. Both
//! are updated under the same lock, and every update first checks whether the
//! tracker was disposed, so a response that lands after disposal is dropped.

mod config;
mod events;
mod merge;
mod state;

pub use config::TrackerConfig;
pub use events::TrackerEvent;
pub use state::{
    FailureReason, PollStats, TerminalOutcome, TerminalStatus, TrackerState,
    TrackerStatus,
};

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_model::{
    Consent, MaxDepth, ScanId, ScanJob, ScanSnapshot, ScanStatus,
    ScanSubmission, ValidationError,
};

use crate::error::GatewayError;
use crate::gateway::ScanGateway;
use crate::report::aggregate;
use merge::{StatusChange, merge_snapshot};

/// Why [`ScanTracker::submit`] did not start a job.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    /// Local input validation failed; nothing was sent.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The service call failed; the tracker is back in `Idle`.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Another job is still in flight.
    #[error("tracker is busy ({0})")]
    Busy(TrackerState),

    #[error("tracker has been disposed")]
    Disposed,
}

/// Why [`ScanTracker::attach`] did not start tracking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error("tracker is busy ({0})")]
    Busy(TrackerState),

    #[error("tracker has been disposed")]
    Disposed,
}

/// Drives one scan job at a time from submission to a settled outcome.
pub struct ScanTracker {
    gateway: Arc<dyn ScanGateway>,
    config: TrackerConfig,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for ScanTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanTracker")
            .field("gateway", &self.gateway)
            .field("state", &self.shared.status.borrow().state)
            .field("disposed", &self.shared.lifetime.is_cancelled())
            .finish()
    }
}

impl ScanTracker {
    pub fn new(gateway: Arc<dyn ScanGateway>, config: TrackerConfig) -> Self {
        let (status, _) = watch::channel(TrackerStatus::default());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            gateway,
            config,
            shared: Arc::new(Shared {
                status,
                events,
                lifetime: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<dyn ScanGateway> {
        &self.gateway
    }

    /// Current status snapshot.
    pub fn status(&self) -> TrackerStatus {
        self.shared.status.borrow().clone()
    }

    pub fn state(&self) -> TrackerState {
        self.shared.status.borrow().state
    }

    /// Receiver that observes every status change.
    pub fn watch(&self) -> watch::Receiver<TrackerStatus> {
        self.shared.status.subscribe()
    }

    /// Stream of lifecycle events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.shared.events.subscribe()
    }

    /// Token cancelled when the tracker is disposed.
    pub fn lifetime(&self) -> CancellationToken {
        self.shared.lifetime.clone()
    }

    /// Validate raw input, then [`submit`](Self::submit) it.
    ///
    /// Invalid input is rejected before any network call.
    pub async fn submit_input(
        &self,
        target_url: &str,
        max_depth: i64,
        consent: Consent,
    ) -> Result<ScanId, SubmitError> {
        let submission = ScanSubmission::new(target_url, max_depth, consent)?;
        self.submit(submission).await
    }

    /// Create a scan job on the service and start polling it.
    ///
    /// Allowed from `Idle` or a previous `Terminal` state. On gateway failure
    /// the tracker returns to `Idle` and records the error in
    /// [`TrackerStatus::last_error`].
    pub async fn submit(
        &self,
        submission: ScanSubmission,
    ) -> Result<ScanId, SubmitError> {
        self.begin(TrackerState::Submitting, None)
            .map_err(SubmitError::from)?;

        info!(target_url = %submission.target_url(), max_depth = %submission.max_depth(), "submitting scan");

        let request = submission.to_request();
        let created = tokio::select! {
            biased;
            _ = self.shared.lifetime.cancelled() => return Err(SubmitError::Disposed),
            result = self.gateway.create_scan(&request) => result,
        };

        let accepted = created.and_then(|created| {
            ScanId::new(created.scan_id).ok_or_else(|| GatewayError::Service {
                status: 200,
                message: "scan accepted without an id".to_string(),
            })
        });

        let id = match accepted {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "scan submission failed");
                self.shared.update(|status, events| {
                    if status.state != TrackerState::Submitting {
                        return false;
                    }
                    status.last_error = Some(err.clone());
                    transition(status, events, TrackerState::Idle);
                    true
                });
                return Err(SubmitError::Gateway(err));
            }
        };

        let job = ScanJob::queued(id.clone(), &submission);
        let started = self.shared.update(|status, events| {
            if status.state != TrackerState::Submitting {
                return false;
            }
            status.job = Some(job);
            events.push(TrackerEvent::Submitted {
                scan_id: id.clone(),
            });
            transition(status, events, TrackerState::Polling);
            true
        });
        if !started {
            return Err(SubmitError::Disposed);
        }

        info!(scan_id = %id, "scan accepted");
        self.spawn_poller(id.clone(), Instant::now() + self.config.poll_interval());
        Ok(id)
    }

    /// Start tracking a scan that already exists on the service.
    ///
    /// The first poll is issued immediately and fills in the job details.
    pub async fn attach(&self, id: ScanId) -> Result<(), AttachError> {
        let job = ScanJob::placeholder(id.clone(), "", MaxDepth::default());
        self.begin(TrackerState::Polling, Some(job))?;
        self.shared.update(|status, events| {
            if status.state != TrackerState::Polling {
                return false;
            }
            events.push(TrackerEvent::Submitted {
                scan_id: id.clone(),
            });
            true
        });

        info!(scan_id = %id, "attached to existing scan");
        self.spawn_poller(id, Instant::now());
        Ok(())
    }

    /// Wait until the current job settles.
    ///
    /// Returns the outcome for `Terminal`. Returns `None` if the tracker was
    /// disposed first, or right away when no job is in flight (`Idle`, e.g.
    /// after a failed [`submit`](Self::submit)).
    pub async fn wait_settled(&self) -> Option<Arc<TerminalOutcome>> {
        let mut rx = self.shared.status.subscribe();
        let status = rx
            .wait_for(|status| {
                status.state.is_settled()
                    || status.state == TrackerState::Idle
                    || status.disposed
            })
            .await
            .ok()?;
        match status.state {
            TrackerState::Terminal(_) => status.outcome.clone(),
            _ => None,
        }
    }

    /// Stop all background work.
    ///
    /// Idempotent. A job in flight moves to `Aborted`; `Idle` and `Terminal`
    /// keep their state. Any response still in flight is discarded.
    pub fn dispose(&self) {
        self.shared.status.send_if_modified(|status| {
            if status.disposed {
                return false;
            }
            // Cancel under the status lock so no update can slip in between.
            self.shared.lifetime.cancel();
            status.disposed = true;
            if status.state.is_active() {
                let from = status.state;
                status.state = TrackerState::Aborted;
                let _ = self.shared.events.send(TrackerEvent::StateChanged {
                    from,
                    to: TrackerState::Aborted,
                });
                info!(from = %from, "tracker disposed mid-job");
            } else {
                debug!(state = %status.state, "tracker disposed");
            }
            true
        });

        if let Some(handle) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    fn begin(
        &self,
        next: TrackerState,
        job: Option<ScanJob>,
    ) -> Result<(), AttachError> {
        let mut rejected = None;
        self.shared.update(|status, events| {
            if !status.state.accepts_new_job() {
                rejected = Some(AttachError::Busy(status.state));
                return false;
            }
            status.job = job;
            status.outcome = None;
            status.stats = PollStats::default();
            status.last_error = None;
            transition(status, events, next);
            true
        });

        if self.shared.lifetime.is_cancelled() {
            return Err(AttachError::Disposed);
        }
        match rejected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn spawn_poller(&self, id: ScanId, first_tick: Instant) {
        let poller = Poller {
            gateway: Arc::clone(&self.gateway),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            id,
        };
        let handle = tokio::spawn(poller.run(first_tick));
        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for ScanTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl From<AttachError> for SubmitError {
    fn from(err: AttachError) -> Self {
        match err {
            AttachError::Busy(state) => SubmitError::Busy(state),
            AttachError::Disposed => SubmitError::Disposed,
        }
    }
}

/// State shared between the tracker handle and its poll task.
struct Shared {
    status: watch::Sender<TrackerStatus>,
    events: broadcast::Sender<TrackerEvent>,
    lifetime: CancellationToken,
}

impl Shared {
    /// Mutate the status under its lock unless the tracker was disposed.
    ///
    /// Events pushed by `apply` are broadcast while the lock is still held,
    /// which keeps them in the same order as the status changes. Returns
    /// whether `apply` accepted the update.
    fn update<F>(&self, apply: F) -> bool
    where
        F: FnOnce(&mut TrackerStatus, &mut Vec<TrackerEvent>) -> bool,
    {
        let mut applied = false;
        self.status.send_if_modified(|status| {
            if self.lifetime.is_cancelled() {
                return false;
            }
            let mut events = Vec::new();
            applied = apply(status, &mut events);
            for event in events {
                // No subscribers is fine.
                let _ = self.events.send(event);
            }
            applied
        });
        applied
    }
}

fn transition(
    status: &mut TrackerStatus,
    events: &mut Vec<TrackerEvent>,
    to: TrackerState,
) {
    let from = status.state;
    if from == to {
        return;
    }
    status.state = to;
    debug!(%from, %to, "tracker state changed");
    events.push(TrackerEvent::StateChanged { from, to });
}

/// Seal the current job into a terminal outcome.
fn settle(
    status: &mut TrackerStatus,
    events: &mut Vec<TrackerEvent>,
    terminal: TerminalStatus,
    reason: Option<FailureReason>,
) {
    let Some(job) = status.job.as_mut() else {
        return;
    };
    if terminal == TerminalStatus::Failed {
        job.status = ScanStatus::Failed;
        if job.error.is_none() {
            job.error = reason.as_ref().map(ToString::to_string);
        }
    }

    let job = job.clone();
    let outcome = Arc::new(TerminalOutcome {
        status: terminal,
        report: aggregate(&job),
        job,
        reason,
    });

    let reason_text = outcome
        .reason
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    info!(
        scan_id = %outcome.job.id,
        status = ?terminal,
        reason = %reason_text,
        "scan settled"
    );

    status.outcome = Some(Arc::clone(&outcome));
    transition(status, events, TrackerState::Terminal(terminal));
    events.push(TrackerEvent::Finished(outcome));
}

/// What the poll loop does after handling one response.
enum Step {
    Continue,
    Settle,
    Stop,
}

/// Background task that polls one job until it settles.
struct Poller {
    gateway: Arc<dyn ScanGateway>,
    config: TrackerConfig,
    shared: Arc<Shared>,
    id: ScanId,
}

impl Poller {
    async fn run(self, first_tick: Instant) {
        let period = self.config.poll_interval();
        let mut ticker = time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let started = Instant::now();
        let mut issued: u64 = 0;

        loop {
            let scheduled = tokio::select! {
                biased;
                _ = self.shared.lifetime.cancelled() => {
                    debug!(scan_id = %self.id, "poll loop cancelled");
                    return;
                }
                at = ticker.tick() => at,
            };

            let elapsed = started.elapsed();
            let over_duration = self
                .config
                .max_poll_duration()
                .is_some_and(|limit| elapsed >= limit);
            let over_ticks = self
                .config
                .max_poll_ticks
                .is_some_and(|limit| issued >= limit);
            if over_duration || over_ticks {
                warn!(
                    scan_id = %self.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    ticks = issued,
                    "polling ceiling reached"
                );
                self.finish_failed(FailureReason::TimeoutExceeded {
                    elapsed,
                    ticks: issued,
                });
                return;
            }

            issued += 1;
            let tick = issued;
            let result = tokio::select! {
                biased;
                _ = self.shared.lifetime.cancelled() => return,
                result = self.gateway.get_scan(&self.id) => result,
            };
            let skipped = missed_ticks(scheduled, period);
            if skipped > 0 {
                // Drop the overdue ticks; the next poll is one period from now.
                ticker.reset();
            }

            let step = match result {
                Ok(snapshot) => self.on_snapshot(tick, skipped, &snapshot),
                Err(GatewayError::NotFound(_)) => {
                    warn!(scan_id = %self.id, tick, "scan vanished from service");
                    self.finish_failed(FailureReason::JobNotFound);
                    Step::Stop
                }
                Err(err) => self.on_poll_error(tick, skipped, err),
            };

            match step {
                Step::Continue => {}
                Step::Settle => {
                    self.settle_completed().await;
                    return;
                }
                Step::Stop => return,
            }
        }
    }

    fn on_snapshot(&self, tick: u64, skipped: u64, snapshot: &ScanSnapshot) -> Step {
        let mut step = Step::Stop;
        self.shared.update(|status, events| {
            if status.state != TrackerState::Polling {
                return false;
            }
            let Some(job) = status.job.as_mut() else {
                return false;
            };

            let change = merge_snapshot(job, snapshot);
            let job_status = job.status;
            let job = job.clone();

            status.stats.ticks += 1;
            status.stats.successful += 1;
            status.stats.skipped_ticks += skipped;

            match change {
                StatusChange::Advanced { from, to } => {
                    info!(scan_id = %self.id, tick, %from, %to, "scan advanced");
                }
                StatusChange::Ignored { reported } => {
                    warn!(
                        scan_id = %self.id,
                        tick,
                        reported = %reported,
                        kept = %job_status,
                        "ignoring unexpected scan status"
                    );
                    status.stats.regressions += 1;
                    events.push(TrackerEvent::StatusRegressed {
                        tick,
                        reported,
                        kept: job_status,
                    });
                }
                StatusChange::Unchanged => {}
            }

            debug!(
                scan_id = %self.id,
                tick,
                progress = job.progress,
                pages = job.pages_crawled,
                "poll ok"
            );
            events.push(TrackerEvent::Progress { tick, job });

            step = match job_status {
                ScanStatus::Completed => {
                    transition(status, events, TrackerState::Settling);
                    Step::Settle
                }
                ScanStatus::Failed => {
                    let reason = status
                        .job
                        .as_ref()
                        .and_then(|job| job.error.clone())
                        .unwrap_or_else(|| "scan failed".to_string());
                    settle(
                        status,
                        events,
                        TerminalStatus::Failed,
                        Some(FailureReason::Remote(reason)),
                    );
                    Step::Stop
                }
                _ => Step::Continue,
            };
            true
        });
        step
    }

    fn on_poll_error(&self, tick: u64, skipped: u64, err: GatewayError) -> Step {
        warn!(scan_id = %self.id, tick, error = %err, "poll failed; retrying next tick");
        let accepted = self.shared.update(|status, events| {
            if status.state != TrackerState::Polling {
                return false;
            }
            status.stats.ticks += 1;
            status.stats.failed += 1;
            status.stats.skipped_ticks += skipped;
            status.last_error = Some(err.clone());
            events.push(TrackerEvent::PollFailed { tick, error: err });
            true
        });
        if accepted { Step::Continue } else { Step::Stop }
    }

    async fn settle_completed(&self) {
        tokio::select! {
            biased;
            _ = self.shared.lifetime.cancelled() => return,
            _ = time::sleep(self.config.settle_delay()) => {}
        }
        self.shared.update(|status, events| {
            if status.state != TrackerState::Settling {
                return false;
            }
            settle(status, events, TerminalStatus::Completed, None);
            true
        });
    }

    fn finish_failed(&self, reason: FailureReason) {
        self.shared.update(|status, events| {
            if status.state != TrackerState::Polling {
                return false;
            }
            settle(status, events, TerminalStatus::Failed, Some(reason));
            true
        });
    }
}

/// Whole periods that passed between a tick's scheduled time and now.
fn missed_ticks(scheduled: Instant, period: std::time::Duration) -> u64 {
    let late = Instant::now().saturating_duration_since(scheduled);
    match period.as_nanos() {
        0 => 0,
        nanos => u64::try_from(late.as_nanos() / nanos).unwrap_or(u64::MAX),
    }
}
