//! Dashboard snapshots.
//!
//! [`DashboardSummary`] arrives both by pull (`GET /dashboard/summary`)
//! and by push (the `/ws/dashboard` stream), so the two paths share one
//! type. The time series and the activity feed are pull-only.

use serde::{Deserialize, Serialize};

use crate::run::RunStatus;
use crate::types::{DbId, Timestamp};

/// Default window for `GET /dashboard/runs-per-day`.
pub const DEFAULT_RUNS_PER_DAY_WINDOW: u32 = 7;

/// Default page size for `GET /dashboard/recent-runs`.
pub const DEFAULT_RECENT_RUNS_LIMIT: u32 = 10;

/// High-level platform counters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_jobs: u64,
    pub active_pipelines: u64,
    pub todays_runs: u64,
    /// Percentage (0-100) of today's runs that exited non-zero.
    pub failure_rate: f64,
}

/// One bucket of the runs-per-day series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRunCount {
    /// ISO date, e.g. `2024-05-01`.
    pub date: String,
    pub total: u64,
    pub failed: u64,
}

/// One row of the recent activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentRun {
    pub id: DbId,
    pub job_name: String,
    pub status: RunStatus,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_from_push_payload() {
        // The stream sends integer zeros for the fields it does not compute.
        let json = r#"{"total_jobs":12,"active_pipelines":3,"todays_runs":0,"failure_rate":0.0}"#;
        let summary: DashboardSummary = serde_json::from_str(json).unwrap();
        assert_eq!(summary.total_jobs, 12);
        assert_eq!(summary.active_pipelines, 3);
        assert_eq!(summary.failure_rate, 0.0);
    }

    #[test]
    fn summary_accepts_integer_failure_rate() {
        let json = r#"{"total_jobs":1,"active_pipelines":0,"todays_runs":4,"failure_rate":25}"#;
        let summary: DashboardSummary = serde_json::from_str(json).unwrap();
        assert_eq!(summary.failure_rate, 25.0);
    }

    #[test]
    fn recent_run_without_start_time() {
        let json = r#"{"id":9,"job_name":"Process PDF","status":"failed","duration_ms":500,"started_at":null,"exit_code":1}"#;
        let run: RecentRun = serde_json::from_str(json).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.started_at.is_none());
        assert_eq!(run.exit_code, Some(1));
    }
}
