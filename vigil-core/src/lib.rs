//! # Vigil Core
//!
//! Client-side machinery for driving a remote security-scan service from
//! submission to a validated report.
//!
//! ## Architecture
//!
//! - [`gateway`]: the HTTP contract with the scan service behind the
//!   [`ScanGateway`] trait, plus the `reqwest`-backed [`ApiClient`].
//! - [`tracker`]: the [`ScanTracker`] state machine that submits one scan and
//!   polls it until it settles, fails, or is disposed.
//! - [`report`]: the result aggregator that validates a terminal job and
//!   produces a display-ready [`ScanReport`].
//! - [`testing`]: a scripted in-memory gateway for deterministic tests.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vigil_core::{ApiClient, GatewayConfig, ScanTracker, TrackerConfig};
//! use vigil_model::{Consent, ScanSubmission};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Arc::new(ApiClient::new(GatewayConfig::default())?);
//! let tracker = ScanTracker::new(gateway, TrackerConfig::default());
//!
//! let submission =
//!     ScanSubmission::new("http://localhost:5001", 2, Consent::Granted)?;
//! tracker.submit(submission).await?;
//!
//! if let Some(outcome) = tracker.wait_settled().await {
//!     println!("{} finished as {:?}", outcome.job.id, outcome.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod gateway;
pub mod report;
pub mod testing;
pub mod tracker;

pub use error::{GatewayError, GatewayResult};
pub use gateway::{
    ApiClient, DeleteOutcome, GatewayConfig, ScanGateway, delete_idempotent,
};
pub use report::{
    MalformedPayloadError, PayloadIssue, ReportOutcome, ScanReport,
    SummaryDiscrepancy, aggregate, best_report,
};
pub use tracker::{
    AttachError, FailureReason, PollStats, ScanTracker, SubmitError,
    TerminalOutcome, TerminalStatus, TrackerConfig, TrackerEvent, TrackerState,
    TrackerStatus,
};
