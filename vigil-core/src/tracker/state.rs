use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use vigil_model::ScanJob;

use crate::error::GatewayError;
use crate::report::ReportOutcome;

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalStatus {
    Completed,
    Failed,
}

/// Lifecycle state of a [`ScanTracker`](super::ScanTracker).
///
/// ```text
/// Idle -> Submitting -> Polling -> Settling -> Terminal(Completed)
///              |            \-> Terminal(Failed)
///              \-> Idle (create failed)
/// Submitting | Polling | Settling --dispose--> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "status", rename_all = "snake_case")]
pub enum TrackerState {
    #[default]
    Idle,
    Submitting,
    Polling,
    Settling,
    Terminal(TerminalStatus),
    Aborted,
}

impl TrackerState {
    /// A job is in flight: network calls or timers may still fire.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TrackerState::Submitting | TrackerState::Polling | TrackerState::Settling
        )
    }

    /// No further transitions will happen for the current job.
    pub fn is_settled(self) -> bool {
        matches!(self, TrackerState::Terminal(_) | TrackerState::Aborted)
    }

    /// Whether a new job may be started from this state.
    pub fn accepts_new_job(self) -> bool {
        matches!(self, TrackerState::Idle | TrackerState::Terminal(_))
    }
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerState::Idle => f.write_str("idle"),
            TrackerState::Submitting => f.write_str("submitting"),
            TrackerState::Polling => f.write_str("polling"),
            TrackerState::Settling => f.write_str("settling"),
            TrackerState::Terminal(TerminalStatus::Completed) => {
                f.write_str("completed")
            }
            TrackerState::Terminal(TerminalStatus::Failed) => f.write_str("failed"),
            TrackerState::Aborted => f.write_str("aborted"),
        }
    }
}

/// Why a job ended in [`TerminalStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The service reported the scan as failed.
    #[error("scan failed: {0}")]
    Remote(String),

    /// The service no longer knows the job.
    #[error("scan job no longer exists on the service")]
    JobNotFound,

    /// Polling hit its elapsed-time or tick ceiling.
    #[error("gave up waiting after {} ({ticks} polls)", humanize(.elapsed))]
    TimeoutExceeded { elapsed: Duration, ticks: u64 },
}

fn humanize(elapsed: &Duration) -> String {
    format!("{}s", elapsed.as_secs())
}

/// Final record of a settled job.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalOutcome {
    pub status: TerminalStatus,
    pub job: ScanJob,
    pub reason: Option<FailureReason>,
    pub report: ReportOutcome,
}

/// Poll loop counters for the current job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollStats {
    /// Polls that returned (successfully or not).
    pub ticks: u64,
    pub successful: u64,
    pub failed: u64,
    /// Scheduled ticks dropped because a poll was still outstanding.
    pub skipped_ticks: u64,
    /// Responses whose status was unknown or behind the current one.
    pub regressions: u64,
}

/// Immutable snapshot of everything a tracker exposes.
#[derive(Debug, Clone, Default)]
pub struct TrackerStatus {
    pub state: TrackerState,
    pub job: Option<ScanJob>,
    pub outcome: Option<Arc<TerminalOutcome>>,
    pub stats: PollStats,
    /// Most recent gateway failure for the current job, if any.
    pub last_error: Option<GatewayError>,
    /// The tracker has been disposed and accepts no more work.
    pub disposed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idle_and_terminal_accept_new_jobs() {
        assert!(TrackerState::Idle.accepts_new_job());
        assert!(TrackerState::Terminal(TerminalStatus::Failed).accepts_new_job());
        for state in [
            TrackerState::Submitting,
            TrackerState::Polling,
            TrackerState::Settling,
            TrackerState::Aborted,
        ] {
            assert!(!state.accepts_new_job(), "{state} should be busy");
        }
    }

    #[test]
    fn timeout_reason_reads_naturally() {
        let reason = FailureReason::TimeoutExceeded {
            elapsed: Duration::from_secs(1_800),
            ticks: 900,
        };
        assert_eq!(reason.to_string(), "gave up waiting after 1800s (900 polls)");
    }
}
