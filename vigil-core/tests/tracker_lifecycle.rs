use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast::Receiver;
use tokio::time;
use vigil_core::testing::{ScriptedGateway, created, snapshot};
use vigil_core::{
    AttachError, FailureReason, GatewayError, PayloadIssue, ScanTracker,
    SubmitError, TerminalStatus, TrackerConfig, TrackerEvent, TrackerState,
};
use vigil_model::{Consent, ScanId, ScanSnapshot, ScanStatus, ValidationError};

const TARGET: &str = "http://localhost:5001";

fn tracker_with(gateway: &Arc<ScriptedGateway>, config: TrackerConfig) -> ScanTracker {
    ScanTracker::new(gateway.clone(), config)
}

fn completed_clean(id: &str) -> ScanSnapshot {
    let mut snap = snapshot(id, "completed", 100);
    snap.summary = Some(BTreeMap::from([
        ("critical".to_string(), 0),
        ("high".to_string(), 0),
        ("medium".to_string(), 0),
        ("low".to_string(), 0),
        ("info".to_string(), 0),
    ]));
    snap
}

fn drain(events: &mut Receiver<TrackerEvent>) -> Vec<TrackerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn transitions(events: &[TrackerEvent]) -> Vec<(TrackerState, TrackerState)> {
    events
        .iter()
        .filter_map(|event| match event {
            TrackerEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn submission_runs_through_every_stage_to_a_clean_report() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    gateway.push_polls([
        snapshot("abc123", "crawling", 20),
        snapshot("abc123", "testing", 60),
        completed_clean("abc123"),
    ]);

    let tracker = tracker_with(&gateway, TrackerConfig::default());
    let mut events = tracker.subscribe();

    let id = tracker
        .submit_input(TARGET, 2, Consent::Granted)
        .await
        .unwrap();
    assert_eq!(id.as_str(), "abc123");

    let status = tracker.status();
    assert_eq!(status.state, TrackerState::Polling);
    let job = status.job.unwrap();
    assert_eq!(job.status, ScanStatus::Queued);
    assert_eq!(job.target_url, TARGET);
    assert_eq!(job.max_depth.get(), 2);

    let outcome = tracker.wait_settled().await.unwrap();
    assert_eq!(outcome.status, TerminalStatus::Completed);
    assert!(outcome.reason.is_none());
    assert_eq!(outcome.job.status, ScanStatus::Completed);

    let report = outcome.report.as_ref().unwrap();
    assert!(report.vulnerabilities.is_empty());
    assert_eq!(report.summary.total(), 0);
    assert!(report.summary_discrepancy.is_none());
    assert!(!report.is_degraded());

    let stats = tracker.status().stats;
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.successful, 3);

    let seen = drain(&mut events);
    assert_eq!(
        transitions(&seen),
        vec![
            (TrackerState::Idle, TrackerState::Submitting),
            (TrackerState::Submitting, TrackerState::Polling),
            (TrackerState::Polling, TrackerState::Settling),
            (
                TrackerState::Settling,
                TrackerState::Terminal(TerminalStatus::Completed)
            ),
        ]
    );
    let statuses: Vec<ScanStatus> = seen
        .iter()
        .filter_map(|event| match event {
            TrackerEvent::Progress { job, .. } => Some(job.status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        [ScanStatus::Crawling, ScanStatus::Testing, ScanStatus::Completed]
    );
    assert!(matches!(seen.last(), Some(TrackerEvent::Finished(_))));

    // The loop is gone: no more polls however long we wait.
    time::sleep(Duration::from_secs(120)).await;
    assert_eq!(gateway.calls().get, 3);
}

#[tokio::test(start_paused = true)]
async fn missing_consent_never_reaches_the_network() {
    let gateway = Arc::new(ScriptedGateway::default());
    let tracker = tracker_with(&gateway, TrackerConfig::default());

    let err = tracker
        .submit_input(TARGET, 2, Consent::Missing)
        .await
        .unwrap_err();

    assert_eq!(err, SubmitError::Invalid(ValidationError::ConsentRequired));
    assert_eq!(tracker.state(), TrackerState::Idle);
    assert_eq!(gateway.calls().network_total(), 0);
}

#[tokio::test(start_paused = true)]
async fn create_timeout_returns_to_idle_without_polling() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Err(GatewayError::Network("request timed out".into())));
    let tracker = tracker_with(&gateway, TrackerConfig::default());

    let err = tracker
        .submit_input(TARGET, 2, Consent::Granted)
        .await
        .unwrap_err();

    assert!(matches!(err, SubmitError::Gateway(GatewayError::Network(_))));
    let status = tracker.status();
    assert_eq!(status.state, TrackerState::Idle);
    assert!(status.job.is_none());
    assert!(matches!(status.last_error, Some(GatewayError::Network(_))));

    time::sleep(Duration::from_secs(30)).await;
    assert_eq!(gateway.calls().get, 0);
}

#[tokio::test(start_paused = true)]
async fn not_found_mid_poll_fails_the_job_and_stops() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    gateway.push_polls([
        snapshot("abc123", "crawling", 10),
        snapshot("abc123", "testing", 40),
    ]);
    gateway.push_poll(Err(GatewayError::NotFound("abc123".into())));

    let tracker = tracker_with(&gateway, TrackerConfig::default());
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();

    let outcome = tracker.wait_settled().await.unwrap();
    assert_eq!(outcome.status, TerminalStatus::Failed);
    assert_eq!(outcome.reason, Some(FailureReason::JobNotFound));
    assert_eq!(outcome.job.status, ScanStatus::Failed);
    assert!(outcome.job.error.is_some());
    // A failed job needs no findings.
    assert!(outcome.report.is_ok());

    time::sleep(Duration::from_secs(60)).await;
    assert_eq!(gateway.calls().get, 3);
}

#[tokio::test(start_paused = true)]
async fn remote_failure_is_terminal_immediately() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    let mut failed = snapshot("abc123", "failed", 0);
    failed.error = Some("Target unreachable".into());
    gateway.push_polls([snapshot("abc123", "crawling", 10), failed]);

    let tracker = tracker_with(&gateway, TrackerConfig::default());
    let mut events = tracker.subscribe();
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();

    let outcome = tracker.wait_settled().await.unwrap();
    assert_eq!(
        outcome.reason,
        Some(FailureReason::Remote("Target unreachable".into()))
    );
    assert_eq!(outcome.job.error.as_deref(), Some("Target unreachable"));

    let seen = drain(&mut events);
    assert!(
        !transitions(&seen)
            .iter()
            .any(|(_, to)| *to == TrackerState::Settling),
        "failed jobs skip the settle delay"
    );
}

#[tokio::test(start_paused = true)]
async fn dispose_while_submitting_aborts_without_polling() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create_delayed(Ok(created("abc123")), Duration::from_secs(5));
    let tracker = Arc::new(tracker_with(&gateway, TrackerConfig::default()));

    let submitting = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move {
            tracker.submit_input(TARGET, 2, Consent::Granted).await
        })
    };

    let mut rx = tracker.watch();
    rx.wait_for(|s| s.state == TrackerState::Submitting)
        .await
        .unwrap();
    tracker.dispose();

    assert_eq!(submitting.await.unwrap(), Err(SubmitError::Disposed));
    assert_eq!(tracker.state(), TrackerState::Aborted);
    assert!(tracker.wait_settled().await.is_none());

    time::sleep(Duration::from_secs(60)).await;
    let calls = gateway.calls();
    assert_eq!(calls.create, 1);
    assert_eq!(calls.get, 0);
}

#[tokio::test(start_paused = true)]
async fn dispose_while_polling_stops_further_calls() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    gateway.push_polls([snapshot("abc123", "crawling", 10)]);

    let tracker = tracker_with(&gateway, TrackerConfig::default());
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();

    time::sleep(Duration::from_millis(5_500)).await;
    let before = gateway.calls().get;
    assert_eq!(before, 2);

    tracker.dispose();
    tracker.dispose();
    assert_eq!(tracker.state(), TrackerState::Aborted);

    time::sleep(Duration::from_secs(60)).await;
    assert_eq!(gateway.calls().get, before);
    assert!(tracker.status().outcome.is_none());
}

#[tokio::test(start_paused = true)]
async fn response_landing_after_dispose_is_ignored() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    gateway.push_poll_delayed(Ok(completed_clean("abc123")), Duration::from_secs(3));

    let tracker = tracker_with(&gateway, TrackerConfig::default());
    let mut events = tracker.subscribe();
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();

    // First poll goes out at 2s and is still in flight at 3s.
    time::sleep(Duration::from_secs(3)).await;
    tracker.dispose();
    time::sleep(Duration::from_secs(10)).await;

    let status = tracker.status();
    assert_eq!(status.state, TrackerState::Aborted);
    assert_eq!(status.job.unwrap().status, ScanStatus::Queued);
    assert!(
        !drain(&mut events)
            .iter()
            .any(|e| matches!(e, TrackerEvent::Progress { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn dropping_the_tracker_stops_polling() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    gateway.push_polls([snapshot("abc123", "crawling", 10)]);

    let tracker = tracker_with(&gateway, TrackerConfig::default());
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();
    time::sleep(Duration::from_millis(2_500)).await;
    drop(tracker);

    time::sleep(Duration::from_secs(60)).await;
    assert_eq!(gateway.calls().get, 1);
}

#[tokio::test(start_paused = true)]
async fn transient_poll_errors_keep_polling() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    gateway
        .push_poll(Err(GatewayError::Network("connection reset".into())))
        .push_poll(Err(GatewayError::Service {
            status: 502,
            message: "Bad Gateway".into(),
        }))
        .push_polls([snapshot("abc123", "testing", 50), completed_clean("abc123")]);

    let tracker = tracker_with(&gateway, TrackerConfig::default());
    let mut events = tracker.subscribe();
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();

    let outcome = tracker.wait_settled().await.unwrap();
    assert_eq!(outcome.status, TerminalStatus::Completed);

    let stats = tracker.status().stats;
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.successful, 2);
    assert_eq!(stats.ticks, 4);

    let failures: Vec<u64> = drain(&mut events)
        .iter()
        .filter_map(|event| match event {
            TrackerEvent::PollFailed { tick, .. } => Some(*tick),
            _ => None,
        })
        .collect();
    assert_eq!(failures, [1, 2]);
}

#[tokio::test(start_paused = true)]
async fn status_regression_keeps_the_current_status() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    let mut regressed = snapshot("abc123", "crawling", 30);
    regressed.pages_crawled = 2;
    let mut testing = snapshot("abc123", "testing", 60);
    testing.pages_crawled = 9;
    gateway.push_polls([testing, regressed, completed_clean("abc123")]);

    let tracker = tracker_with(&gateway, TrackerConfig::default());
    let mut events = tracker.subscribe();
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();

    let outcome = tracker.wait_settled().await.unwrap();
    assert_eq!(outcome.status, TerminalStatus::Completed);
    assert_eq!(outcome.job.pages_crawled, 9);
    assert_eq!(tracker.status().stats.regressions, 1);

    let seen = drain(&mut events);
    assert!(seen.iter().any(|event| matches!(
        event,
        TrackerEvent::StatusRegressed { tick: 2, reported, kept: ScanStatus::Testing }
            if reported == "crawling"
    )));
    let second = seen.iter().find_map(|event| match event {
        TrackerEvent::Progress { tick: 2, job } => Some(job.clone()),
        _ => None,
    });
    let second = second.unwrap();
    assert_eq!(second.status, ScanStatus::Testing);
    assert_eq!(second.progress, 60);
}

#[tokio::test(start_paused = true)]
async fn slow_polls_skip_ticks_instead_of_queueing() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    gateway.push_poll_delayed(
        Ok(snapshot("abc123", "crawling", 10)),
        Duration::from_secs(5),
    );
    gateway.push_polls([completed_clean("abc123")]);

    let tracker = tracker_with(&gateway, TrackerConfig::default());
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();

    let outcome = tracker.wait_settled().await.unwrap();
    assert_eq!(outcome.status, TerminalStatus::Completed);
    assert_eq!(gateway.calls().get, 2);
    assert_eq!(tracker.status().stats.skipped_ticks, 2);
}

#[tokio::test(start_paused = true)]
async fn elapsed_ceiling_forces_timeout() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    gateway.push_polls([snapshot("abc123", "crawling", 10)]);

    let config = TrackerConfig::default()
        .with_max_poll_duration(Some(Duration::from_secs(10)));
    let tracker = tracker_with(&gateway, config);
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();

    let outcome = tracker.wait_settled().await.unwrap();
    assert_eq!(outcome.status, TerminalStatus::Failed);
    assert!(matches!(
        outcome.reason,
        Some(FailureReason::TimeoutExceeded { ticks: 4, .. })
    ));
    assert_eq!(gateway.calls().get, 4);
}

#[tokio::test(start_paused = true)]
async fn tick_ceiling_forces_timeout() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    gateway.push_polls([snapshot("abc123", "testing", 50)]);

    let config = TrackerConfig::default()
        .with_max_poll_duration(None)
        .with_max_poll_ticks(Some(3));
    let tracker = tracker_with(&gateway, config);
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();

    let outcome = tracker.wait_settled().await.unwrap();
    assert!(matches!(
        outcome.reason,
        Some(FailureReason::TimeoutExceeded { ticks: 3, .. })
    ));
    assert_eq!(gateway.calls().get, 3);
}

#[tokio::test(start_paused = true)]
async fn one_job_at_a_time_then_resubmit_after_terminal() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway
        .push_create(Ok(created("first")))
        .push_create(Ok(created("second")));
    gateway.push_polls([snapshot("first", "testing", 50), completed_clean("first")]);

    let tracker = tracker_with(&gateway, TrackerConfig::default());
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();

    assert_eq!(
        tracker.submit_input(TARGET, 3, Consent::Granted).await,
        Err(SubmitError::Busy(TrackerState::Polling))
    );
    assert_eq!(
        tracker.attach(ScanId::new("other").unwrap()).await,
        Err(AttachError::Busy(TrackerState::Polling))
    );
    assert_eq!(gateway.calls().create, 1);

    tracker.wait_settled().await.unwrap();
    let id = tracker
        .submit_input(TARGET, 3, Consent::Granted)
        .await
        .unwrap();
    assert_eq!(id.as_str(), "second");

    let requests = gateway.create_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].max_depth, Some(3));
}

#[tokio::test(start_paused = true)]
async fn attach_polls_an_existing_scan_immediately() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_polls([completed_clean("abc123")]);

    let tracker = tracker_with(&gateway, TrackerConfig::default());
    tracker.attach(ScanId::new("abc123").unwrap()).await.unwrap();

    let outcome = tracker.wait_settled().await.unwrap();
    assert_eq!(outcome.status, TerminalStatus::Completed);
    assert_eq!(outcome.job.target_url, TARGET);
    assert_eq!(gateway.calls().create, 0);
    assert_eq!(gateway.calls().get, 1);
}

#[tokio::test(start_paused = true)]
async fn disposed_tracker_rejects_new_work() {
    let gateway = Arc::new(ScriptedGateway::default());
    let tracker = tracker_with(&gateway, TrackerConfig::default());

    tracker.dispose();
    assert_eq!(tracker.state(), TrackerState::Idle);
    assert!(tracker.wait_settled().await.is_none());
    assert_eq!(
        tracker.submit_input(TARGET, 2, Consent::Granted).await,
        Err(SubmitError::Disposed)
    );
    assert_eq!(gateway.calls().network_total(), 0);
}

#[tokio::test(start_paused = true)]
async fn dispose_while_settling_aborts_without_outcome() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    gateway.push_polls([completed_clean("abc123")]);

    let config = TrackerConfig::default().with_settle_delay(Duration::from_secs(5));
    let tracker = tracker_with(&gateway, config);
    let mut events = tracker.subscribe();
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();

    let mut rx = tracker.watch();
    rx.wait_for(|s| s.state == TrackerState::Settling)
        .await
        .unwrap();
    tracker.dispose();

    time::sleep(Duration::from_secs(10)).await;
    let status = tracker.status();
    assert_eq!(status.state, TrackerState::Aborted);
    assert!(status.outcome.is_none());
    assert!(tracker.wait_settled().await.is_none());

    let seen = drain(&mut events);
    assert!(
        !seen
            .iter()
            .any(|event| matches!(event, TrackerEvent::Finished(_))),
        "{seen:?}"
    );
    assert_eq!(
        transitions(&seen).last(),
        Some(&(TrackerState::Settling, TrackerState::Aborted))
    );
    assert_eq!(gateway.calls().get, 1);
}

#[tokio::test(start_paused = true)]
async fn completed_scan_with_a_wrong_typed_finding_settles_with_a_degraded_report() {
    let body: ScanSnapshot = serde_json::from_value(json!({
        "scan_id": "abc123",
        "target_url": TARGET,
        "status": "completed",
        "progress": 100.0,
        "vulnerabilities": [
            {"type": "SQL Injection", "severity": "High", "cvss_score": 8.0},
            {"type": "XSS", "severity": "Medium", "cvss_score": "5.4"},
            {"type": "Open Redirect", "severity": "Low", "cvss_score": 3.1,
             "remediation": {"summary": "Validate targets", "steps": null}}
        ],
        "summary": {"high": 1, "medium": "1", "low": 1.0}
    }))
    .unwrap();

    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Ok(created("abc123")));
    gateway.push_polls([body]);

    let tracker = tracker_with(&gateway, TrackerConfig::default());
    tracker.submit_input(TARGET, 2, Consent::Granted).await.unwrap();

    let outcome = tracker.wait_settled().await.unwrap();
    assert_eq!(outcome.status, TerminalStatus::Completed);
    assert!(outcome.reason.is_none());
    assert_eq!(outcome.job.progress, 100);

    let err = outcome.report.as_ref().unwrap_err();
    assert_eq!(err.issues.len(), 1);
    assert!(matches!(
        err.issues[0],
        PayloadIssue::Undecodable { index: 1, .. }
    ));
    let report = err.report();
    assert_eq!(report.vulnerabilities.len(), 2);
    assert_eq!(report.summary.high, 1);
    assert_eq!(report.summary.low, 1);
    assert!(report.summary_discrepancy.is_some());
    assert_eq!(gateway.calls().get, 1);
}

#[tokio::test(start_paused = true)]
async fn zero_poll_interval_still_polls_to_completion() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_polls([
        snapshot("abc123", "testing", 50),
        completed_clean("abc123"),
    ]);

    let config = TrackerConfig {
        poll_interval_ms: 0,
        ..TrackerConfig::default()
    };
    let tracker = tracker_with(&gateway, config);
    tracker.attach(ScanId::new("abc123").unwrap()).await.unwrap();

    let outcome = tracker.wait_settled().await.unwrap();
    assert_eq!(outcome.status, TerminalStatus::Completed);
    assert_eq!(gateway.calls().get, 2);
}

#[tokio::test(start_paused = true)]
async fn wait_settled_returns_at_once_when_nothing_is_in_flight() {
    let gateway = Arc::new(ScriptedGateway::default());
    gateway.push_create(Err(GatewayError::Network("connection refused".into())));
    let tracker = tracker_with(&gateway, TrackerConfig::default());

    assert!(tracker.wait_settled().await.is_none());

    tracker
        .submit_input(TARGET, 2, Consent::Granted)
        .await
        .unwrap_err();
    assert_eq!(tracker.state(), TrackerState::Idle);
    let waited = time::timeout(Duration::from_secs(1), tracker.wait_settled()).await;
    assert_eq!(waited.ok(), Some(None));
}
