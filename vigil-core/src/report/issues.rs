use serde::Serialize;
use thiserror::Error;
use vigil_model::ScanStatus;

use super::ScanReport;

/// A single problem found while validating a terminal payload.
///
/// `index` is the position of the offending record in the list the service
/// returned, before any sorting.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadIssue {
    #[error("finding #{index} could not be decoded: {reason}")]
    Undecodable { index: usize, reason: String },

    #[error("finding #{index} has no type")]
    MissingType { index: usize },

    #[error("finding #{index} has no severity")]
    MissingSeverity { index: usize },

    #[error("finding #{index} has unknown severity '{value}'")]
    UnknownSeverity { index: usize, value: String },

    #[error("finding #{index} has no CVSS score")]
    MissingCvss { index: usize },

    #[error("finding #{index} has CVSS score {value} outside 0.0..=10.0")]
    CvssOutOfRange { index: usize, value: f64 },

    #[error("scan is still {status}; no report is available yet")]
    NotTerminal { status: ScanStatus },
}

impl PayloadIssue {
    /// Position of the offending finding, if the issue is about one.
    pub fn index(&self) -> Option<usize> {
        match self {
            PayloadIssue::Undecodable { index, .. }
            | PayloadIssue::MissingType { index }
            | PayloadIssue::MissingSeverity { index }
            | PayloadIssue::UnknownSeverity { index, .. }
            | PayloadIssue::MissingCvss { index }
            | PayloadIssue::CvssOutOfRange { index, .. } => Some(*index),
            PayloadIssue::NotTerminal { .. } => None,
        }
    }
}

/// The terminal payload failed validation.
///
/// Still carries the report built from whatever did validate so callers can
/// show partial results with the problems flagged.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("scan {} returned a malformed payload ({} issue(s))", .degraded.scan_id, .issues.len())]
pub struct MalformedPayloadError {
    pub issues: Vec<PayloadIssue>,
    pub degraded: Box<ScanReport>,
}

impl MalformedPayloadError {
    pub fn report(&self) -> &ScanReport {
        &self.degraded
    }

    pub fn into_report(self) -> ScanReport {
        *self.degraded
    }
}
