//! Pipeline definitions as exposed by the platform's `/pipelines` endpoints.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Idle,
    Running,
    Degraded,
    Failed,
}

impl PipelineStatus {
    /// Pipelines counted as "active" by the dashboard summary.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Degraded)
    }
}

/// A pipeline as returned by `GET /pipelines/` and `GET /pipelines/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: DbId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Ordered step definitions (job references plus per-step config).
    #[serde(default)]
    pub steps: Vec<serde_json::Map<String, serde_json::Value>>,
    pub status: PipelineStatus,
}

/// Payload for `POST /pipelines/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPipeline {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<serde_json::Map<String, serde_json::Value>>,
}
