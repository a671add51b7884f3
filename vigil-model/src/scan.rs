use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::lenient;
use crate::vulnerability::RawVulnerability;

/// Pipeline stage of a remote scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Queued,
    Crawling,
    Testing,
    Completed,
    Failed,
}

impl ScanStatus {
    /// Position in the pipeline. Both terminal states share the last stage.
    pub fn stage(self) -> u8 {
        match self {
            ScanStatus::Queued => 0,
            ScanStatus::Crawling => 1,
            ScanStatus::Testing => 2,
            ScanStatus::Completed | ScanStatus::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Queued => "queued",
            ScanStatus::Crawling => "crawling",
            ScanStatus::Testing => "testing",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" => Ok(ScanStatus::Queued),
            "crawling" => Ok(ScanStatus::Crawling),
            "testing" => Ok(ScanStatus::Testing),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            other => Err(format!("unrecognised scan status '{other}'")),
        }
    }
}

/// Body of `POST /api/scans/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartScanRequest {
    pub target_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u8>,
}

/// Response of `POST /api/scans/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCreated {
    pub scan_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Full job snapshot returned by `GET /api/scans/{id}` and `GET /api/scans`.
///
/// Decoded loosely: status stays a string, counters are signed and accept
/// floats or numeric strings, `null` reads as empty, and findings decode one
/// record at a time. Odd values are normalised by the tracker or flagged by
/// the aggregator instead of failing the whole poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSnapshot {
    #[serde(deserialize_with = "lenient::null_as_default")]
    pub scan_id: String,
    #[serde(deserialize_with = "lenient::null_as_default")]
    pub target_url: String,
    #[serde(deserialize_with = "lenient::null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "lenient::integer")]
    pub progress: i64,
    #[serde(deserialize_with = "lenient::text")]
    pub start_time: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub end_time: Option<String>,
    #[serde(deserialize_with = "lenient::integer")]
    pub pages_crawled: i64,
    #[serde(deserialize_with = "lenient::integer")]
    pub input_points_found: i64,
    #[serde(deserialize_with = "lenient::integer")]
    pub vulnerabilities_found: i64,
    #[serde(deserialize_with = "lenient::findings")]
    pub vulnerabilities: Vec<RawVulnerability>,
    #[serde(deserialize_with = "lenient::summary")]
    pub summary: Option<BTreeMap<String, i64>>,
    #[serde(deserialize_with = "lenient::text")]
    pub error: Option<String>,
    #[serde(deserialize_with = "lenient::depth")]
    pub max_depth: Option<u8>,
}

impl ScanSnapshot {
    /// Reported status, if it is one the client understands.
    pub fn parsed_status(&self) -> Option<ScanStatus> {
        self.status.parse().ok()
    }

    /// Progress clamped into `[0, 100]`.
    pub fn clamped_progress(&self) -> u8 {
        self.progress.clamp(0, 100) as u8
    }
}
