use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ScanId;
use crate::scan::{ScanSnapshot, ScanStatus};
use crate::severity::SeveritySummary;
use crate::submission::{MaxDepth, ScanSubmission};
use crate::timestamp::parse_service_time;
use crate::vulnerability::RawVulnerability;

/// Client-local view of one scan attempt.
///
/// Created in [`ScanStatus::Queued`] when the service accepts a submission
/// and only mutated by the lifecycle tracker as poll responses arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: ScanId,
    pub target_url: String,
    pub max_depth: MaxDepth,
    pub status: ScanStatus,
    pub progress: u8,
    pub pages_crawled: u64,
    pub input_points_found: u64,
    pub vulnerabilities_found: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Populated only once the job is terminal.
    pub vulnerabilities: Vec<RawVulnerability>,
    /// Remote severity counts, retained only on `Completed`.
    pub summary: Option<SeveritySummary>,
    pub error: Option<String>,
}

impl ScanJob {
    /// Job for a freshly accepted submission.
    pub fn queued(id: ScanId, submission: &ScanSubmission) -> Self {
        Self::placeholder(id, submission.target_url(), submission.max_depth())
    }

    /// Job for a scan known only by id; the first poll fills in the rest.
    pub fn placeholder(
        id: ScanId,
        target_url: impl Into<String>,
        max_depth: MaxDepth,
    ) -> Self {
        Self {
            id,
            target_url: target_url.into(),
            max_depth,
            status: ScanStatus::Queued,
            progress: 0,
            pages_crawled: 0,
            input_points_found: 0,
            vulnerabilities_found: 0,
            started_at: None,
            finished_at: None,
            vulnerabilities: Vec::new(),
            summary: None,
            error: None,
        }
    }

    /// Direct, non-incremental conversion of a listed snapshot.
    ///
    /// Used for one-shot reads (listing, detail) where no previous state
    /// exists to merge with. Returns `None` when the id is blank.
    pub fn from_snapshot(snapshot: &ScanSnapshot) -> Option<Self> {
        let id = ScanId::new(snapshot.scan_id.clone())?;
        let status = snapshot.parsed_status().unwrap_or(ScanStatus::Queued);
        let max_depth = snapshot
            .max_depth
            .and_then(|d| MaxDepth::new(i64::from(d)).ok())
            .unwrap_or_default();

        let mut job = Self::placeholder(id, &snapshot.target_url, max_depth);
        job.status = status;
        job.progress = snapshot.clamped_progress();
        job.pages_crawled = non_negative(snapshot.pages_crawled);
        job.input_points_found = non_negative(snapshot.input_points_found);
        job.vulnerabilities_found = non_negative(snapshot.vulnerabilities_found);
        job.started_at = snapshot.start_time.as_deref().and_then(parse_service_time);
        job.finished_at = snapshot.end_time.as_deref().and_then(parse_service_time);
        if status.is_terminal() {
            job.vulnerabilities = snapshot.vulnerabilities.clone();
        }
        if status == ScanStatus::Completed {
            job.summary = snapshot.summary.as_ref().map(SeveritySummary::from_reported);
        }
        if status == ScanStatus::Failed {
            job.error = snapshot.error.clone();
        }
        Some(job)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Clamp a signed wire counter to zero.
pub fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
