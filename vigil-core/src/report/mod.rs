//! Result aggregation for terminal scan jobs.
//!
//! [`aggregate`] turns the loosely decoded findings of a finished job into a
//! validated, severity-sorted [`ScanReport`]. Counts are always recomputed
//! from the findings that validated; the service's own summary is only used
//! to flag a discrepancy.

mod issues;

pub use issues::{MalformedPayloadError, PayloadIssue};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use vigil_model::{
    MaxDepth, RawVulnerability, Remediation, ScanId, ScanJob, ScanStatus,
    Severity, SeveritySummary, Vulnerability,
};

/// Inclusive CVSS v3 range.
const CVSS_RANGE: std::ops::RangeInclusive<f64> = 0.0..=10.0;

/// Outcome of aggregating a job: a clean report, or a degraded one with the
/// problems that were found.
pub type ReportOutcome = Result<ScanReport, MalformedPayloadError>;

/// The report to display regardless of whether validation passed.
pub fn best_report(outcome: &ReportOutcome) -> &ScanReport {
    match outcome {
        Ok(report) => report,
        Err(err) => err.report(),
    }
}

/// Remote and recomputed severity counts that did not agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryDiscrepancy {
    pub reported: SeveritySummary,
    pub recomputed: SeveritySummary,
}

/// Display-ready result of a terminal scan job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub scan_id: ScanId,
    pub target_url: String,
    pub status: ScanStatus,
    pub max_depth: MaxDepth,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_crawled: u64,
    pub input_points_found: u64,
    pub vulnerabilities_found: u64,
    /// Validated findings, most severe first.
    pub vulnerabilities: Vec<Vulnerability>,
    /// Counts recomputed from `vulnerabilities`.
    pub summary: SeveritySummary,
    pub summary_discrepancy: Option<SummaryDiscrepancy>,
    pub issues: Vec<PayloadIssue>,
    pub error: Option<String>,
}

impl ScanReport {
    /// True when some findings were excluded or the job was not terminal.
    pub fn is_degraded(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Wall-clock scan duration when both timestamps are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }

    /// Findings of one severity tier, in report order.
    pub fn findings_of(
        &self,
        severity: Severity,
    ) -> impl Iterator<Item = &Vulnerability> {
        self.vulnerabilities
            .iter()
            .filter(move |v| v.severity == severity)
    }
}

/// Validate and summarize a job's findings.
///
/// Invalid records are dropped and described as [`PayloadIssue`]s. Any issue
/// turns the result into [`MalformedPayloadError`], which still carries the
/// report built from the records that did validate. A failed job with no
/// findings is a valid, empty report.
pub fn aggregate(job: &ScanJob) -> ReportOutcome {
    let mut issues = Vec::new();

    if !job.status.is_terminal() {
        issues.push(PayloadIssue::NotTerminal { status: job.status });
    }

    let mut vulnerabilities: Vec<Vulnerability> = job
        .vulnerabilities
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| match validate(index, raw) {
            Ok(vuln) => Some(vuln),
            Err(issue) => {
                issues.push(issue);
                None
            }
        })
        .collect();

    // `sort_by` is stable, so equal tiers keep arrival order.
    vulnerabilities.sort_by(|a, b| b.severity.cmp(&a.severity));

    let summary: SeveritySummary =
        vulnerabilities.iter().map(|v| v.severity).collect();

    let summary_discrepancy = job
        .summary
        .as_ref()
        .filter(|reported| **reported != summary)
        .map(|reported| SummaryDiscrepancy {
            reported: *reported,
            recomputed: summary,
        });

    if let Some(discrepancy) = &summary_discrepancy {
        warn!(
            scan_id = %job.id,
            reported = discrepancy.reported.total(),
            recomputed = discrepancy.recomputed.total(),
            "remote severity summary disagrees with findings"
        );
    }

    let report = ScanReport {
        scan_id: job.id.clone(),
        target_url: job.target_url.clone(),
        status: job.status,
        max_depth: job.max_depth,
        started_at: job.started_at,
        finished_at: job.finished_at,
        pages_crawled: job.pages_crawled,
        input_points_found: job.input_points_found,
        vulnerabilities_found: job.vulnerabilities_found,
        vulnerabilities,
        summary,
        summary_discrepancy,
        issues: issues.clone(),
        error: job.error.clone(),
    };

    if issues.is_empty() {
        debug!(
            scan_id = %job.id,
            findings = report.vulnerabilities.len(),
            "report aggregated"
        );
        Ok(report)
    } else {
        warn!(
            scan_id = %job.id,
            issues = issues.len(),
            kept = report.vulnerabilities.len(),
            "report degraded by malformed payload"
        );
        Err(MalformedPayloadError {
            issues,
            degraded: Box::new(report),
        })
    }
}

fn validate(
    index: usize,
    raw: &RawVulnerability,
) -> Result<Vulnerability, PayloadIssue> {
    if let Some(reason) = &raw.decode_error {
        return Err(PayloadIssue::Undecodable {
            index,
            reason: reason.clone(),
        });
    }

    let vuln_type = raw
        .vuln_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(PayloadIssue::MissingType { index })?;

    let severity = match raw.severity.as_deref().map(str::trim) {
        None | Some("") => return Err(PayloadIssue::MissingSeverity { index }),
        Some(value) => value.parse::<Severity>().map_err(|_| {
            PayloadIssue::UnknownSeverity {
                index,
                value: value.to_string(),
            }
        })?,
    };

    let cvss_score = raw.cvss_score.ok_or(PayloadIssue::MissingCvss { index })?;
    if !cvss_score.is_finite() || !CVSS_RANGE.contains(&cvss_score) {
        return Err(PayloadIssue::CvssOutOfRange {
            index,
            value: cvss_score,
        });
    }

    let text = |field: &Option<String>| field.clone().unwrap_or_default();
    let remediation = raw
        .remediation
        .as_ref()
        .map(|r| Remediation {
            summary: r.summary.clone().unwrap_or_default(),
            steps: r.steps.clone(),
        })
        .unwrap_or_default();

    Ok(Vulnerability {
        vuln_type: vuln_type.to_string(),
        subtype: text(&raw.subtype),
        severity,
        url: text(&raw.url),
        method: text(&raw.method),
        parameter: text(&raw.parameter),
        payload: text(&raw.payload),
        evidence: text(&raw.evidence),
        description: text(&raw.description),
        cvss_score,
        cwe: text(&raw.cwe),
        owasp: text(&raw.owasp),
        remediation,
    })
}
