//! REST client for the DataFlow platform API.
//!
//! Wraps the request/response side of the platform (job and pipeline
//! CRUD, run actions, dashboard snapshots) using [`reqwest`]. Every
//! failure surfaces as an [`ApiError`]; callers that poll treat all of
//! them as retryable at their next tick.

use dataflow_core::dashboard::{DailyRunCount, DashboardSummary, RecentRun};
use dataflow_core::endpoints;
use dataflow_core::job::{Job, NewJob};
use dataflow_core::pipeline::{NewPipeline, Pipeline};
use dataflow_core::run::JobRun;
use dataflow_core::types::DbId;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// HTTP client for one platform deployment.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

/// Errors from the platform REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, body decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The platform rejected the request with a non-2xx status.
    #[error("API error ({status}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-provided `detail`, or the raw body when there is none.
        message: String,
    },
}

impl ApiError {
    /// Every failure is worth retrying on the next scheduled pull.
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// HTTP status of a rejected request, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// FastAPI-style error body: `{"detail": "..."}`.
#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

impl ApiClient {
    /// Create a client for the API rooted at `base_url`
    /// (e.g. `http://localhost:8000/api/v1`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            token: None,
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ---- jobs ----

    pub async fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
        self.get(endpoints::JOBS).await
    }

    pub async fn get_job(&self, id: DbId) -> Result<Job, ApiError> {
        self.get(&endpoints::job(id)).await
    }

    pub async fn create_job(&self, job: &NewJob) -> Result<Job, ApiError> {
        self.post(endpoints::JOBS, Some(job)).await
    }

    /// Trigger a run. Returns the job with its updated status.
    pub async fn run_job(&self, id: DbId) -> Result<Job, ApiError> {
        self.post::<(), _>(&endpoints::run_job(id), None).await
    }

    /// Cancel the job's active task. Returns the job with its updated status.
    pub async fn cancel_job(&self, id: DbId) -> Result<Job, ApiError> {
        self.post::<(), _>(&endpoints::cancel_job(id), None).await
    }

    /// Run history for a job, newest first.
    pub async fn job_runs(&self, id: DbId) -> Result<Vec<JobRun>, ApiError> {
        self.get(&endpoints::job_runs(id)).await
    }

    // ---- pipelines ----

    pub async fn list_pipelines(&self) -> Result<Vec<Pipeline>, ApiError> {
        self.get(endpoints::PIPELINES).await
    }

    pub async fn get_pipeline(&self, id: DbId) -> Result<Pipeline, ApiError> {
        self.get(&endpoints::pipeline(id)).await
    }

    pub async fn create_pipeline(&self, pipeline: &NewPipeline) -> Result<Pipeline, ApiError> {
        self.post(endpoints::PIPELINES, Some(pipeline)).await
    }

    pub async fn run_pipeline(&self, id: DbId) -> Result<Pipeline, ApiError> {
        self.post::<(), _>(&endpoints::run_pipeline(id), None).await
    }

    // ---- dashboard ----

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary, ApiError> {
        self.get(endpoints::DASHBOARD_SUMMARY).await
    }

    pub async fn runs_per_day(&self, days: u32) -> Result<Vec<DailyRunCount>, ApiError> {
        self.get(&endpoints::runs_per_day(days)).await
    }

    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<RecentRun>, ApiError> {
        self.get(&endpoints::recent_runs(limit)).await
    }

    /// Fetch any path as untyped JSON.
    pub async fn get_value(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        self.get(path).await
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        tracing::trace!(path, "GET");
        let response = self
            .authorize(self.client.get(self.url(path)))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn post<B, T>(&self, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::trace!(path, "POST");
        let mut request = self.authorize(self.client.post(self.url(path)));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        Self::parse_response(response).await
    }

    /// Ensure the response has a success status code, otherwise turn the
    /// body into an [`ApiError::Status`].
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Extract a human-readable message from an error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        // Validation errors carry a structured list.
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_with_single_slash() {
        let client = ApiClient::new("http://localhost:8000/api/v1/");
        assert_eq!(client.base_url(), "http://localhost:8000/api/v1");
        assert_eq!(client.url("/jobs/"), "http://localhost:8000/api/v1/jobs/");
        assert_eq!(client.url("jobs/7"), "http://localhost:8000/api/v1/jobs/7");
    }

    #[test]
    fn error_message_prefers_detail_string() {
        assert_eq!(error_message(r#"{"detail":"Job not found"}"#), "Job not found");
    }

    #[test]
    fn error_message_serializes_structured_detail() {
        let msg = error_message(r#"{"detail":[{"loc":["body","name"],"msg":"field required"}]}"#);
        assert!(msg.contains("field required"));
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(error_message("Internal Server Error"), "Internal Server Error");
    }

    #[test]
    fn status_errors_are_retryable() {
        let err = ApiError::Status {
            status: 503,
            message: "busy".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(503));
    }
}
