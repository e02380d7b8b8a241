//! Job definitions as exposed by the platform's `/jobs` endpoints.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// What kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Scraper,
    PdfProcessor,
    ApiSync,
    Custom,
}

/// Lifecycle status of a job definition (not of an individual run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running,
    Failed,
    Completed,
}

/// A job as returned by `GET /jobs/` and `GET /jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: DbId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Cron expression, if the job runs on a schedule.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub configuration: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub owner_id: Option<DbId>,
    pub status: JobStatus,
    #[serde(default)]
    pub last_run_at: Option<Timestamp>,
    #[serde(default)]
    pub next_run_at: Option<Timestamp>,
}

/// Payload for `POST /jobs/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default)]
    pub configuration: serde_json::Map<String, serde_json::Value>,
}
