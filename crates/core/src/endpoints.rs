//! Well-known platform paths.
//!
//! REST paths are relative to the pull API base URL (which already
//! carries the `/api/v1` prefix). Stream paths are relative to the push
//! stream base URL.

use crate::types::DbId;

/// Job collection. The trailing slash matches the server's route.
pub const JOBS: &str = "/jobs/";

/// Pipeline collection.
pub const PIPELINES: &str = "/pipelines/";

/// Summary counters.
pub const DASHBOARD_SUMMARY: &str = "/dashboard/summary";

/// Push stream mirroring [`DASHBOARD_SUMMARY`].
pub const DASHBOARD_STREAM: &str = "/ws/dashboard";

pub fn job(id: DbId) -> String {
    format!("/jobs/{id}")
}

pub fn run_job(id: DbId) -> String {
    format!("/jobs/{id}/run")
}

pub fn cancel_job(id: DbId) -> String {
    format!("/jobs/{id}/cancel")
}

pub fn job_runs(id: DbId) -> String {
    format!("/jobs/{id}/runs")
}

pub fn pipeline(id: DbId) -> String {
    format!("/pipelines/{id}")
}

pub fn run_pipeline(id: DbId) -> String {
    format!("/pipelines/{id}/run")
}

pub fn runs_per_day(days: u32) -> String {
    format!("/dashboard/runs-per-day?days={days}")
}

pub fn recent_runs(limit: u32) -> String {
    format!("/dashboard/recent-runs?limit={limit}")
}

/// Log stream for the most recent task of a job.
pub fn job_logs_stream(id: DbId) -> String {
    format!("/ws/jobs/{id}/logs")
}
