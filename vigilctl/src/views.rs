//! Plain-text renderings of service data. Nothing here does I/O.

use std::fmt;

use chrono::{DateTime, Utc};
use vigil_core::ScanReport;
use vigil_model::{ApiInfo, ScanJob, ScanStatus, Severity, Vulnerability};

const TIME_FORMAT: &str = "%b %d, %Y %H:%M:%S UTC";

pub fn health_line(base_url: &str, healthy: bool) -> String {
    if healthy {
        format!("{base_url}: healthy")
    } else {
        format!("{base_url}: unhealthy")
    }
}

/// One-line progress summary printed on every poll.
pub fn progress_line(job: &ScanJob) -> String {
    format!(
        "[{:<9}] {:>3}%  pages {}  inputs {}  findings {}",
        job.status.as_str(),
        job.progress,
        job.pages_crawled,
        job.input_points_found,
        job.vulnerabilities_found
    )
}

#[derive(Debug)]
pub struct ApiInfoView<'a>(pub &'a ApiInfo);

impl fmt::Display for ApiInfoView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.0;
        writeln!(f, "{} {}", info.name, info.version)?;
        if !info.description.is_empty() {
            writeln!(f, "{}", info.description)?;
        }
        if !info.endpoints.is_empty() {
            writeln!(f)?;
            writeln!(f, "Endpoints:")?;
            for (name, path) in &info.endpoints {
                writeln!(f, "  {name:<12} {path}")?;
            }
        }
        Ok(())
    }
}

/// Scan listing in service order.
#[derive(Debug)]
pub struct ScanTable<'a>(pub &'a [ScanJob]);

impl fmt::Display for ScanTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No scans yet.");
        }
        let id_width = self
            .0
            .iter()
            .map(|job| job.id.as_str().len())
            .max()
            .unwrap_or(0)
            .max(2);
        writeln!(
            f,
            "{:<id_width$}  {:<9}  {:>8}  {:>8}  TARGET",
            "ID", "STATUS", "PROGRESS", "FINDINGS"
        )?;
        for job in self.0 {
            writeln!(
                f,
                "{:<id_width$}  {:<9}  {:>7}%  {:>8}  {}",
                job.id.as_str(),
                job.status.as_str(),
                job.progress,
                job.vulnerabilities_found,
                job.target_url
            )?;
        }
        Ok(())
    }
}

/// Detail view of a scan that has not finished yet.
#[derive(Debug)]
pub struct JobView<'a>(pub &'a ScanJob);

impl fmt::Display for JobView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let job = self.0;
        writeln!(f, "Scan {}", job.id)?;
        writeln!(f, "  Target:           {}", job.target_url)?;
        writeln!(f, "  Status:           {}", job.status)?;
        writeln!(f, "  Progress:         {}%", job.progress)?;
        writeln!(f, "  Max depth:        {}", job.max_depth)?;
        writeln!(f, "  Pages crawled:    {}", job.pages_crawled)?;
        writeln!(f, "  Input points:     {}", job.input_points_found)?;
        writeln!(f, "  Vulnerabilities:  {}", job.vulnerabilities_found)?;
        if let Some(started) = job.started_at {
            writeln!(f, "  Started:          {}", timestamp(started))?;
        }
        Ok(())
    }
}

/// Full report of a finished scan.
#[derive(Debug)]
pub struct ReportView<'a>(pub &'a ScanReport);

impl fmt::Display for ReportView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "Scan Results")?;
        writeln!(f, "  Target:  {}", report.target_url)?;
        writeln!(f, "  Status:  {}", report.status)?;
        writeln!(f, "  Scan ID: {}", report.scan_id)?;
        if let Some(started) = report.started_at {
            writeln!(f, "  Started: {}", timestamp(started))?;
        }
        if let Some(finished) = report.finished_at {
            writeln!(f, "  Ended:   {}", timestamp(finished))?;
        }
        if let Some(took) = report.duration() {
            writeln!(f, "  Took:    {}s", took.num_seconds().max(0))?;
        }
        writeln!(
            f,
            "  Crawled {} pages, {} input points",
            report.pages_crawled, report.input_points_found
        )?;
        if let Some(error) = &report.error {
            writeln!(f, "  Error:   {error}")?;
        }

        writeln!(f)?;
        let counts: Vec<String> = Severity::ALL
            .iter()
            .map(|severity| format!("{severity} {}", report.summary.count(*severity)))
            .collect();
        writeln!(f, "Summary: {}", counts.join(" | "))?;

        if let Some(discrepancy) = &report.summary_discrepancy {
            writeln!(
                f,
                "  note: service reported {} findings in its summary, {} were listed",
                discrepancy.reported.total(),
                discrepancy.recomputed.total()
            )?;
        }
        if !report.issues.is_empty() {
            writeln!(
                f,
                "  warning: {} malformed entries in the service response",
                report.issues.len()
            )?;
            for issue in &report.issues {
                writeln!(f, "    - {issue}")?;
            }
        }

        writeln!(f)?;
        if report.vulnerabilities.is_empty() {
            if report.status == ScanStatus::Completed {
                writeln!(f, "No vulnerabilities found")?;
                writeln!(f, "The scan completed without finding any security issues.")?;
            }
            return Ok(());
        }

        writeln!(f, "Vulnerabilities ({})", report.vulnerabilities.len())?;
        for (index, finding) in report.vulnerabilities.iter().enumerate() {
            writeln!(f)?;
            write_finding(f, index + 1, finding)?;
        }
        Ok(())
    }
}

fn write_finding(
    f: &mut fmt::Formatter<'_>,
    number: usize,
    finding: &Vulnerability,
) -> fmt::Result {
    let title = if finding.subtype.is_empty() {
        finding.vuln_type.clone()
    } else {
        format!("{} ({})", finding.vuln_type, finding.subtype)
    };
    writeln!(f, "{number}. [{}] {title}", finding.severity)?;
    if !finding.url.is_empty() {
        if finding.method.is_empty() {
            writeln!(f, "   URL:       {}", finding.url)?;
        } else {
            writeln!(f, "   URL:       {} {}", finding.method, finding.url)?;
        }
    }
    if !finding.parameter.is_empty() {
        writeln!(f, "   Parameter: {}", finding.parameter)?;
    }
    writeln!(f, "   CVSS:      {:.1}", finding.cvss_score)?;
    if !finding.cwe.is_empty() {
        writeln!(f, "   CWE:       {}", finding.cwe)?;
    }
    if !finding.owasp.is_empty() {
        writeln!(f, "   OWASP:     {}", finding.owasp)?;
    }
    if !finding.description.is_empty() {
        writeln!(f, "   {}", finding.description)?;
    }
    if !finding.remediation.summary.is_empty() {
        writeln!(f, "   Fix: {}", finding.remediation.summary)?;
    }
    for step in &finding.remediation.steps {
        writeln!(f, "     - {step}")?;
    }
    Ok(())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format(TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use vigil_core::{aggregate, best_report};
    use vigil_model::{
        MaxDepth, RawRemediation, RawVulnerability, ScanId, SeveritySummary,
    };

    fn job(status: ScanStatus) -> ScanJob {
        let mut job = ScanJob::placeholder(
            ScanId::new("abc123").unwrap(),
            "http://localhost:5001",
            MaxDepth::default(),
        );
        job.status = status;
        job
    }

    fn finding(vuln_type: &str, severity: &str, cvss: f64) -> RawVulnerability {
        RawVulnerability {
            vuln_type: Some(vuln_type.to_string()),
            severity: Some(severity.to_string()),
            cvss_score: Some(cvss),
            url: Some("http://localhost:5001/search".to_string()),
            method: Some("GET".to_string()),
            parameter: Some("q".to_string()),
            cwe: Some("CWE-79".to_string()),
            remediation: Some(RawRemediation {
                summary: Some("Encode output".to_string()),
                steps: vec!["Escape HTML entities".to_string()],
            }),
            ..RawVulnerability::default()
        }
    }

    #[test]
    fn progress_line_shows_counters() {
        let mut job = job(ScanStatus::Crawling);
        job.progress = 45;
        job.pages_crawled = 12;
        job.input_points_found = 3;
        let line = progress_line(&job);
        assert!(line.starts_with("[crawling ]"), "{line}");
        assert!(line.contains(" 45%"));
        assert!(line.contains("pages 12"));
        assert!(line.contains("inputs 3"));
    }

    #[test]
    fn empty_listing_has_a_friendly_message() {
        assert_eq!(ScanTable(&[]).to_string(), "No scans yet.\n");
    }

    #[test]
    fn listing_keeps_service_order() {
        let mut second = job(ScanStatus::Testing);
        second.id = ScanId::new("zzz").unwrap();
        let jobs = vec![job(ScanStatus::Completed), second];
        let text = ScanTable(&jobs).to_string();
        let first_row = text.find("abc123").unwrap();
        let second_row = text.find("zzz").unwrap();
        assert!(first_row < second_row);
        assert!(text.lines().next().unwrap().starts_with("ID"));
    }

    #[test]
    fn report_lists_findings_most_severe_first() {
        let mut job = job(ScanStatus::Completed);
        job.vulnerabilities = vec![
            finding("XSS", "High", 7.5),
            finding("SQL Injection", "Critical", 9.8),
        ];
        job.summary = Some(SeveritySummary {
            critical: 1,
            high: 1,
            ..SeveritySummary::default()
        });
        let outcome = aggregate(&job);
        let text = ReportView(best_report(&outcome)).to_string();

        assert!(text.contains("Vulnerabilities (2)"));
        assert!(text.contains("Summary: Critical 1 | High 1 | Medium 0 | Low 0 | Info 0"));
        let sqli = text.find("[Critical] SQL Injection").unwrap();
        let xss = text.find("[High] XSS").unwrap();
        assert!(sqli < xss);
        assert!(text.contains("URL:       GET http://localhost:5001/search"));
        assert!(text.contains("CVSS:      9.8"));
        assert!(text.contains("- Escape HTML entities"));
        assert!(!text.contains("note:"));
    }

    #[test]
    fn clean_completed_scan_says_so() {
        let outcome = aggregate(&job(ScanStatus::Completed));
        let text = ReportView(best_report(&outcome)).to_string();
        assert!(text.contains("No vulnerabilities found"));
    }

    #[test]
    fn degraded_report_calls_out_bad_entries() {
        let mut job = job(ScanStatus::Completed);
        let mut broken = finding("XSS", "Severe", 5.0);
        broken.cwe = None;
        job.vulnerabilities = vec![finding("XSS", "Low", 3.1), broken];
        let outcome = aggregate(&job);
        assert!(outcome.is_err());

        let text = ReportView(best_report(&outcome)).to_string();
        assert!(text.contains("warning: 1 malformed entries"), "{text}");
        assert!(text.contains("finding #1 has unknown severity 'Severe'"));
    }

    #[test]
    fn summary_mismatch_is_noted() {
        let mut job = job(ScanStatus::Completed);
        job.vulnerabilities = vec![finding("XSS", "High", 7.0)];
        job.summary = Some(SeveritySummary::from_reported(&BTreeMap::from([(
            "high".to_string(),
            3,
        )])));
        let outcome = aggregate(&job);
        let text = ReportView(best_report(&outcome)).to_string();
        assert!(text.contains("note: service reported 3 findings"), "{text}");
    }

    #[test]
    fn api_info_lists_endpoints() {
        let info = ApiInfo {
            name: "Web Vulnerability Scanner API".into(),
            version: "1.0.0".into(),
            description: String::new(),
            endpoints: BTreeMap::from([("health".to_string(), "/health".to_string())]),
        };
        let text = ApiInfoView(&info).to_string();
        assert!(text.starts_with("Web Vulnerability Scanner API 1.0.0\n"));
        assert!(text.contains("health"));
        assert!(text.contains("/health"));
    }
}
