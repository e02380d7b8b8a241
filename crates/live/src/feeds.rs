//! Ready-made live views over the platform's two push streams.

use std::sync::Arc;
use std::time::Duration;

use dataflow_core::dashboard::{
    DailyRunCount, DashboardSummary, RecentRun, DEFAULT_RECENT_RUNS_LIMIT,
    DEFAULT_RUNS_PER_DAY_WINDOW,
};
use dataflow_core::endpoints;
use dataflow_core::error::ensure_valid_id;
use dataflow_core::types::DbId;
use tokio::task::JoinHandle;

use crate::projection::LatestEvent;
use crate::refresh::{PullSource, RefreshCoordinator, RefreshHandle, SliceHandle};
use crate::subscription::{StreamConfig, Subscription};
use crate::transport::{Connector, StreamError};

/// The dashboard: summary counters kept current by both the
/// `/ws/dashboard` push stream and the periodic pull, plus the
/// pull-only run series and activity feed.
pub struct DashboardFeed {
    stream: Subscription,
    refresh: RefreshHandle,
    summary: SliceHandle<DashboardSummary>,
    runs_per_day: SliceHandle<Vec<DailyRunCount>>,
    recent_runs: SliceHandle<Vec<RecentRun>>,
    bridge: JoinHandle<()>,
}

impl DashboardFeed {
    /// Open the dashboard stream and start pulling every `refresh_interval`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        connector: Arc<dyn Connector>,
        source: Arc<dyn PullSource>,
        stream_config: &StreamConfig,
        refresh_interval: Duration,
    ) -> Result<Self, StreamError> {
        let stream = Subscription::open(connector, stream_config, endpoints::DASHBOARD_STREAM)?;

        let mut coordinator = RefreshCoordinator::new(source, refresh_interval);
        let summary = coordinator.track("summary", endpoints::DASHBOARD_SUMMARY);
        let runs_per_day = coordinator.track(
            "runs_per_day",
            &endpoints::runs_per_day(DEFAULT_RUNS_PER_DAY_WINDOW),
        );
        let recent_runs = coordinator.track(
            "recent_runs",
            &endpoints::recent_runs(DEFAULT_RECENT_RUNS_LIMIT),
        );
        let refresh = coordinator.start();

        let bridge = tokio::spawn(bridge_summary_pushes(stream.latest(), summary.clone()));

        Ok(Self {
            stream,
            refresh,
            summary,
            runs_per_day,
            recent_runs,
            bridge,
        })
    }

    pub fn summary(&self) -> &SliceHandle<DashboardSummary> {
        &self.summary
    }

    pub fn runs_per_day(&self) -> &SliceHandle<Vec<DailyRunCount>> {
        &self.runs_per_day
    }

    pub fn recent_runs(&self) -> &SliceHandle<Vec<RecentRun>> {
        &self.recent_runs
    }

    /// The underlying push subscription.
    pub fn stream(&self) -> &Subscription {
        &self.stream
    }

    pub fn refresh(&self) -> &RefreshHandle {
        &self.refresh
    }

    /// Stop the stream and the pull timer. Idempotent.
    pub fn teardown(&mut self) {
        self.stream.teardown();
        self.refresh.teardown();
        self.bridge.abort();
    }
}

impl Drop for DashboardFeed {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Forward every summary the stream pushes into the summary slice.
async fn bridge_summary_pushes(
    mut latest: LatestEvent,
    summary: SliceHandle<DashboardSummary>,
) {
    while let Some(event) = latest.changed().await {
        match event.decode::<DashboardSummary>() {
            Some(pushed) => {
                if !summary.push(pushed) {
                    break;
                }
            }
            None => tracing::debug!(%event, "Ignoring dashboard event that is not a summary"),
        }
    }
}

/// Stream the log lines of a job's most recent run.
pub fn job_log_subscription(
    connector: Arc<dyn Connector>,
    config: &StreamConfig,
    job_id: DbId,
) -> Result<Subscription, StreamError> {
    let path = endpoints::job_logs_stream(job_id);
    ensure_valid_id("job", job_id).map_err(|e| StreamError::InvalidTarget {
        target: path.clone(),
        reason: e.to_string(),
    })?;
    Subscription::open(connector, config, &path)
}
