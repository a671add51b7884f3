//! Folding poll responses into the tracked job.

use vigil_model::{
    MaxDepth, ScanJob, ScanSnapshot, ScanStatus, SeveritySummary,
    job::non_negative, timestamp::parse_service_time,
};

/// What a merge did to the job's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StatusChange {
    Unchanged,
    Advanced { from: ScanStatus, to: ScanStatus },
    /// The reported status was unknown or earlier in the pipeline than the
    /// current one and was ignored.
    Ignored { reported: String },
}

/// Apply one poll response to `job`.
///
/// Status only moves forward through the pipeline stages. Counters and
/// progress never decrease. Findings and the remote summary are copied once
/// the job turns terminal.
pub(crate) fn merge_snapshot(
    job: &mut ScanJob,
    snapshot: &ScanSnapshot,
) -> StatusChange {
    let change = match snapshot.parsed_status() {
        Some(reported) if reported == job.status => StatusChange::Unchanged,
        Some(reported) if reported.stage() > job.status.stage() => {
            let from = job.status;
            job.status = reported;
            StatusChange::Advanced { from, to: reported }
        }
        _ => StatusChange::Ignored {
            reported: snapshot.status.clone(),
        },
    };

    // Placeholder jobs (attached by id) learn their target from the service.
    if job.target_url.is_empty() && !snapshot.target_url.is_empty() {
        job.target_url = snapshot.target_url.clone();
        if let Some(depth) = snapshot
            .max_depth
            .and_then(|d| MaxDepth::new(i64::from(d)).ok())
        {
            job.max_depth = depth;
        }
    }

    job.progress = job.progress.max(snapshot.clamped_progress());
    job.pages_crawled = job.pages_crawled.max(non_negative(snapshot.pages_crawled));
    job.input_points_found = job
        .input_points_found
        .max(non_negative(snapshot.input_points_found));
    job.vulnerabilities_found = job
        .vulnerabilities_found
        .max(non_negative(snapshot.vulnerabilities_found));

    if let Some(started) = snapshot.start_time.as_deref().and_then(parse_service_time)
    {
        job.started_at.get_or_insert(started);
    }
    if let Some(finished) = snapshot.end_time.as_deref().and_then(parse_service_time) {
        job.finished_at = Some(finished);
    }

    match job.status {
        ScanStatus::Completed => {
            job.vulnerabilities = snapshot.vulnerabilities.clone();
            job.summary = snapshot.summary.as_ref().map(SeveritySummary::from_reported);
            job.progress = 100;
        }
        ScanStatus::Failed => {
            job.vulnerabilities = snapshot.vulnerabilities.clone();
            job.error = Some(
                snapshot
                    .error
                    .clone()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "scan failed".to_string()),
            );
        }
        _ => {}
    }

    change
}
