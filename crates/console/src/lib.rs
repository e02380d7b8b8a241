//! Terminal consumer for the DataFlow platform.
//!
//! Streams the dashboard and job logs through `dataflow-live` and issues
//! one-shot REST calls through `dataflow-api-client`.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dataflow_api_client::ApiClient;
use dataflow_core::dashboard::{DailyRunCount, DashboardSummary, RecentRun};
use dataflow_core::error::ensure_valid_id;
use dataflow_core::types::DbId;
use dataflow_live::{
    job_log_subscription, DashboardFeed, Event, LiveConfig, Origin, WsConnector,
};

#[derive(Debug, Parser)]
#[command(name = "dataflow-console")]
#[command(about = "Live console for the DataFlow job platform", long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Follow the dashboard (push + periodic refresh) until Ctrl-C
    Dashboard,
    /// Stream the logs of a job's most recent run until Ctrl-C
    Logs { job_id: DbId },
    /// List jobs
    Jobs,
    /// Show one job
    Job { id: DbId },
    /// Show a job's run history
    Runs { job_id: DbId },
    /// Trigger a job run
    RunJob { id: DbId },
    /// Cancel a job's active run
    CancelJob { id: DbId },
    /// List pipelines
    Pipelines,
    /// Show one pipeline
    Pipeline { id: DbId },
    /// Trigger a pipeline run
    RunPipeline { id: DbId },
}

/// Install the global tracing subscriber. Logs go to stderr so stdout
/// carries only command output.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dataflow_console=info,dataflow_live=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

pub async fn run(command: Commands, config: &LiveConfig) -> Result<()> {
    let client = config.api_client();

    match command {
        Commands::Dashboard => follow_dashboard(config, client).await,
        Commands::Logs { job_id } => follow_logs(config, job_id).await,
        Commands::Jobs => print_json(&client.list_jobs().await?),
        Commands::Job { id } => {
            let job = client.get_job(ensure_valid_id("job", id)?).await?;
            print_json(&job)
        }
        Commands::Runs { job_id } => {
            let runs = client.job_runs(ensure_valid_id("job", job_id)?).await?;
            let failed = runs.iter().filter(|run| run.is_failure()).count();
            tracing::info!(job_id, runs = runs.len(), failed, "Fetched run history");
            print_json(&runs)
        }
        Commands::RunJob { id } => {
            let job = client.run_job(ensure_valid_id("job", id)?).await?;
            tracing::info!(job_id = id, status = ?job.status, "Job run requested");
            print_json(&job)
        }
        Commands::CancelJob { id } => {
            let job = client.cancel_job(ensure_valid_id("job", id)?).await?;
            tracing::info!(job_id = id, status = ?job.status, "Job cancel requested");
            print_json(&job)
        }
        Commands::Pipelines => {
            let pipelines = client.list_pipelines().await?;
            let active = pipelines.iter().filter(|p| p.status.is_active()).count();
            tracing::info!(pipelines = pipelines.len(), active, "Fetched pipelines");
            print_json(&pipelines)
        }
        Commands::Pipeline { id } => {
            let pipeline = client.get_pipeline(ensure_valid_id("pipeline", id)?).await?;
            print_json(&pipeline)
        }
        Commands::RunPipeline { id } => {
            let pipeline = client.run_pipeline(ensure_valid_id("pipeline", id)?).await?;
            tracing::info!(pipeline_id = id, status = ?pipeline.status, "Pipeline run requested");
            print_json(&pipeline)
        }
    }
}

async fn follow_dashboard(config: &LiveConfig, client: ApiClient) -> Result<()> {
    let mut feed = DashboardFeed::start(
        Arc::new(WsConnector),
        Arc::new(client),
        &config.stream_config(),
        config.refresh_interval,
    )
    .context("Failed to open dashboard stream")?;

    let mut summary = feed.summary().subscribe();
    let mut runs_per_day = feed.runs_per_day().subscribe();
    let mut recent_runs = feed.recent_runs().subscribe();
    let mut state = feed.stream().watch_state();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Ok(()) = summary.changed() => {
                let displayed = summary.borrow_and_update();
                if let Some(value) = displayed.value() {
                    println!("{}", format_summary(value, displayed.origin()));
                }
            }
            Ok(()) = runs_per_day.changed() => {
                if let Some(days) = runs_per_day.borrow_and_update().value() {
                    for day in days {
                        println!("{}", format_daily(day));
                    }
                }
            }
            Ok(()) = recent_runs.changed() => {
                if let Some(runs) = recent_runs.borrow_and_update().value() {
                    for run in runs {
                        println!("{}", format_recent(run));
                    }
                }
            }
            Ok(()) = state.changed() => {
                let current = *state.borrow_and_update();
                tracing::info!(state = ?current, "Dashboard stream state changed");
            }
            else => break,
        }
    }

    tracing::info!("Shutting down dashboard");
    feed.teardown();
    Ok(())
}

async fn follow_logs(config: &LiveConfig, job_id: DbId) -> Result<()> {
    let subscription = job_log_subscription(Arc::new(WsConnector), &config.stream_config(), job_id)
        .context("Failed to open log stream")?;

    let mut history = subscription.history();
    let mut state = subscription.watch_state();
    let mut printed = 0;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = history.changed() => {
                if !changed {
                    break;
                }
                let fresh = history.since(printed);
                printed += fresh.len();
                for event in &fresh {
                    println!("{}", format_event(event));
                }
            }
            Ok(()) = state.changed() => {
                let current = *state.borrow_and_update();
                tracing::info!(job_id, state = ?current, "Log stream state changed");
            }
        }
    }

    subscription.shutdown().await;
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One log line: plain text as is, `{level, msg}` records as
/// `[level] msg`, any other JSON compactly.
pub fn format_event(event: &Event) -> String {
    match event {
        Event::Opaque(text) => text.clone(),
        Event::Structured(value) => {
            let level = value.get("level").and_then(|v| v.as_str());
            let msg = value.get("msg").and_then(|v| v.as_str());
            match (level, msg) {
                (Some(level), Some(msg)) => format!("[{level}] {msg}"),
                _ => value.to_string(),
            }
        }
    }
}

pub fn format_summary(summary: &DashboardSummary, origin: Option<Origin>) -> String {
    let source = match origin {
        Some(Origin::Pull { tick }) => format!("pull #{tick}"),
        Some(Origin::Push) => "push".to_string(),
        None => "pending".to_string(),
    };
    format!(
        "jobs={} active_pipelines={} runs_today={} failure_rate={:.1}% ({source})",
        summary.total_jobs, summary.active_pipelines, summary.todays_runs, summary.failure_rate,
    )
}

pub fn format_daily(day: &DailyRunCount) -> String {
    format!("{}  total={} failed={}", day.date, day.total, day.failed)
}

pub fn format_recent(run: &RecentRun) -> String {
    let duration = run
        .duration_ms
        .map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "-".to_string());
    format!("#{} {} {:?} {duration}", run.id, run.job_name, run.status)
}
