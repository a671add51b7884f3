//! Core data model definitions shared across Vigil crates.
//!
//! Wire types mirror the remote scan service's JSON contract and are decoded
//! loosely; the client-local [`ScanJob`] and validated [`Vulnerability`] are
//! the shapes the rest of the workspace reasons about.
#![allow(missing_docs)]

pub mod ids;
pub mod job;
pub mod lenient;
pub mod scan;
pub mod service;
pub mod severity;
pub mod submission;
pub mod timestamp;
pub mod vulnerability;

// Intentionally curated re-exports for downstream consumers.
pub use ids::ScanId;
pub use job::ScanJob;
pub use scan::{ScanCreated, ScanSnapshot, ScanStatus, StartScanRequest};
pub use service::{ApiInfo, HealthStatus};
pub use severity::{Severity, SeveritySummary};
pub use submission::{
    Consent, DEFAULT_MAX_DEPTH, MaxDepth, ScanSubmission, ValidationError,
};
pub use vulnerability::{
    RawRemediation, RawVulnerability, Remediation, Vulnerability,
};
