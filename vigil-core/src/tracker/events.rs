use std::sync::Arc;

use vigil_model::{ScanId, ScanJob};

use super::state::{TerminalOutcome, TrackerState};
use crate::error::GatewayError;

/// Notifications broadcast by a tracker, in the order they happened.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    StateChanged {
        from: TrackerState,
        to: TrackerState,
    },
    /// The service accepted the submission (or an existing id was attached).
    Submitted { scan_id: ScanId },
    /// A poll returned and the job was updated.
    Progress { tick: u64, job: ScanJob },
    /// A poll reported a status that was unknown or behind the current one;
    /// the current status was kept.
    StatusRegressed {
        tick: u64,
        reported: String,
        kept: vigil_model::ScanStatus,
    },
    /// A poll failed with a recoverable error; polling continues.
    PollFailed { tick: u64, error: GatewayError },
    Finished(Arc<TerminalOutcome>),
}
