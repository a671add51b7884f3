use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use vigil_config::{ConfigLoad, ConfigLoader};
use vigil_core::{
    ApiClient, DeleteOutcome, ScanGateway, ScanTracker, TerminalOutcome,
    TerminalStatus, TrackerEvent, aggregate, best_report, delete_idempotent,
};
use vigil_model::{Consent, ScanId, ScanJob, ScanSubmission};

use crate::cli::{Cli, Command};
use crate::views::{
    ApiInfoView, JobView, ReportView, ScanTable, health_line, progress_line,
};

pub async fn run(cli: Cli) -> Result<()> {
    let json = cli.json;

    // Reject bad input before touching config or the network.
    let submission = match &cli.command {
        Command::Scan {
            url,
            depth,
            i_have_permission,
        } => Some(ScanSubmission::new(
            url,
            *depth,
            Consent::from(*i_have_permission),
        )?),
        _ => None,
    };

    let load = load_config(&cli)?;

    match cli.command {
        Command::Config => show_config(&load, json),
        Command::Health => {
            let client = client(&load)?;
            let healthy = client
                .check_health()
                .await
                .with_context(|| format!("cannot reach {}", client.base_url()))?;
            if json {
                print_json(&serde_json::json!({
                    "base_url": client.base_url(),
                    "healthy": healthy,
                }))?;
            } else {
                println!("{}", health_line(client.base_url(), healthy));
            }
            if !healthy {
                bail!("scan service at {} is unhealthy", client.base_url());
            }
            Ok(())
        }
        Command::Info => {
            let client = client(&load)?;
            let info = client.api_info().await.context("failed to fetch service info")?;
            if json {
                print_json(&info)
            } else {
                print!("{}", ApiInfoView(&info));
                Ok(())
            }
        }
        Command::Scan { .. } => {
            let submission =
                submission.ok_or_else(|| anyhow!("scan request was not validated"))?;
            let tracker = tracker(&load)?;
            let events = tracker.subscribe();
            let id = tracker.submit(submission).await?;
            if !json {
                println!("Scan {id} started");
            }
            finish(follow(&tracker, events, json).await?, json)
        }
        Command::Watch { id } => {
            let id = parse_id(&id)?;
            let tracker = tracker(&load)?;
            let events = tracker.subscribe();
            tracker.attach(id).await?;
            finish(follow(&tracker, events, json).await?, json)
        }
        Command::List => {
            let client = client(&load)?;
            let snapshots = client.list_scans().await.context("failed to list scans")?;
            let jobs: Vec<ScanJob> =
                snapshots.iter().filter_map(ScanJob::from_snapshot).collect();
            if jobs.len() < snapshots.len() {
                warn!(
                    skipped = snapshots.len() - jobs.len(),
                    "listing contained scans without an id"
                );
            }
            if json {
                print_json(&jobs)
            } else {
                print!("{}", ScanTable(&jobs));
                Ok(())
            }
        }
        Command::Show { id } => {
            let id = parse_id(&id)?;
            let client = client(&load)?;
            let snapshot = client.get_scan(&id).await?;
            let job = ScanJob::from_snapshot(&snapshot)
                .ok_or_else(|| anyhow!("service returned scan {id} without an id"))?;
            if !job.is_terminal() {
                return if json {
                    print_json(&job)
                } else {
                    print!("{}", JobView(&job));
                    Ok(())
                };
            }
            let outcome = aggregate(&job);
            let report = best_report(&outcome);
            if json {
                print_json(report)
            } else {
                print!("{}", ReportView(report));
                Ok(())
            }
        }
        Command::Delete { id } => {
            let id = parse_id(&id)?;
            let client = client(&load)?;
            let outcome = delete_idempotent(&client, &id).await?;
            if json {
                print_json(&serde_json::json!({
                    "scan_id": id,
                    "deleted": outcome == DeleteOutcome::Deleted,
                }))
            } else {
                match outcome {
                    DeleteOutcome::Deleted => println!("Deleted scan {id}"),
                    DeleteOutcome::AlreadyGone => {
                        println!("Scan {id} was already gone")
                    }
                }
                Ok(())
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<ConfigLoad> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(server) = &cli.server {
        loader = loader.with_server_override(server);
    }
    let load = loader.load().context("failed to load client configuration")?;
    for warning in load.warnings.iter() {
        match &warning.hint {
            Some(hint) => warn!(hint = %hint, "{}", warning.message),
            None => warn!("{}", warning.message),
        }
    }
    Ok(load)
}

fn client(load: &ConfigLoad) -> Result<ApiClient> {
    ApiClient::new(load.config.server.clone()).context("failed to build HTTP client")
}

fn tracker(load: &ConfigLoad) -> Result<ScanTracker> {
    let gateway: Arc<dyn ScanGateway> = Arc::new(client(load)?);
    Ok(ScanTracker::new(gateway, load.config.tracker.clone()))
}

fn parse_id(raw: &str) -> Result<ScanId> {
    ScanId::new(raw.trim()).ok_or_else(|| anyhow!("scan id must not be blank"))
}

fn show_config(load: &ConfigLoad, json: bool) -> Result<()> {
    if json {
        return print_json(&load.config);
    }
    println!("# source: {:?}", load.source);
    print!("{}", load.config.to_toml()?);
    Ok(())
}

/// Relay tracker events until the job settles. Ctrl-C disposes the tracker.
async fn follow(
    tracker: &ScanTracker,
    mut events: broadcast::Receiver<TrackerEvent>,
    json: bool,
) -> Result<Arc<TerminalOutcome>> {
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut interrupt => {
                tracker.dispose();
                bail!("interrupted; stopped tracking the scan");
            }
            event = events.recv() => match event {
                Ok(TrackerEvent::Progress { job, .. }) => {
                    if !json {
                        println!("{}", progress_line(&job));
                    }
                }
                Ok(TrackerEvent::PollFailed { tick, error }) => {
                    warn!(tick, error = %error, "poll failed; retrying");
                }
                Ok(TrackerEvent::StatusRegressed { tick, reported, kept }) => {
                    debug!(tick, %reported, %kept, "ignored stale status");
                }
                Ok(TrackerEvent::StateChanged { from, to }) => {
                    debug!(%from, %to, "tracker state changed");
                }
                Ok(TrackerEvent::Submitted { scan_id }) => {
                    info!(%scan_id, "tracking scan");
                }
                Ok(TrackerEvent::Finished(outcome)) => return Ok(outcome),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "progress output fell behind");
                }
                Err(RecvError::Closed) => {
                    return tracker
                        .wait_settled()
                        .await
                        .ok_or_else(|| anyhow!("tracker stopped before the scan finished"));
                }
            }
        }
    }
}

fn finish(outcome: Arc<TerminalOutcome>, json: bool) -> Result<()> {
    let report = best_report(&outcome.report);
    if json {
        print_json(report)?;
    } else {
        println!();
        print!("{}", ReportView(report));
    }

    match outcome.status {
        TerminalStatus::Completed => Ok(()),
        TerminalStatus::Failed => match &outcome.reason {
            Some(reason) => bail!("scan {}: {reason}", outcome.job.id),
            None => bail!("scan {} failed", outcome.job.id),
        },
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
