//! Push-stream subscriptions.
//!
//! A [`Subscription`] owns exactly one logical stream: a background task
//! that connects, feeds every frame through [`normalize`] into the
//! subscription's [`Projection`], and reconnects after a fixed backoff
//! whenever the connection is lost. [`Subscription::teardown`] (also run
//! on drop) is the only way to stop it; after it returns, nothing more
//! reaches the projection.
//!
//! There is no global registry: each consumer holds its own
//! subscription, usually through a [`StreamSlot`].

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::event::normalize;
use crate::projection::{EventHistory, LatestEvent, Projection};
use crate::reconnect::ReconnectPolicy;
use crate::transport::{stream_url, Connector, StreamError, Transport};

/// Transport lifecycle of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No stream requested (empty target).
    Idle,
    /// A connection attempt is in progress.
    Connecting,
    /// Connected and receiving frames.
    Open,
    /// The connection was lost; waiting for the backoff to elapse.
    ReconnectPending,
    /// Torn down. Terminal.
    Closed,
}

/// Where a subscription connects and how it retries.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Base URL the stream path is appended to, e.g.
    /// `http://localhost:8000/api/v1`. HTTP schemes are mapped to their
    /// WebSocket equivalents.
    pub base_url: String,
    pub reconnect: ReconnectPolicy,
}

impl StreamConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Shared handle to the connection state. Never leaves `Closed`.
#[derive(Clone)]
struct StateCell {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl StateCell {
    fn new(initial: ConnectionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Move to `next` unless the subscription is already closed.
    fn set(&self, next: ConnectionState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ConnectionState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        })
    }

    fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }
}

/// One consumer's live stream.
pub struct Subscription {
    target: String,
    projection: Projection,
    state: StateCell,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Start streaming `target` (a path such as `/ws/jobs/7/logs`).
    ///
    /// An empty target yields an idle subscription that never opens a
    /// transport. A target that cannot form a valid stream URL is a
    /// configuration error: it is logged and returned here once, and no
    /// connection is ever attempted.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(
        connector: Arc<dyn Connector>,
        config: &StreamConfig,
        target: &str,
    ) -> Result<Self, StreamError> {
        let projection = Projection::new();
        let cancel = CancellationToken::new();

        if target.trim().is_empty() {
            return Ok(Self {
                target: String::new(),
                projection,
                state: StateCell::new(ConnectionState::Idle),
                cancel,
                task: None,
            });
        }

        let url = stream_url(&config.base_url, target).inspect_err(|e| {
            tracing::error!(path = target, error = %e, "Stream target is not connectable");
        })?;

        let state = StateCell::new(ConnectionState::Connecting);
        let session = StreamTask {
            connector,
            url,
            policy: config.reconnect.clone(),
            projection: projection.clone(),
            state: state.clone(),
            cancel: cancel.clone(),
        };
        let target_owned = target.to_string();
        let task = tokio::spawn(async move {
            tracing::info!(path = %target_owned, "Starting stream task");
            session.run().await;
            tracing::debug!(path = %target_owned, "Stream task exited");
        });

        Ok(Self {
            target: target.to_string(),
            projection,
            state,
            cancel,
            task: Some(task),
        })
    }

    /// The stream path this subscription was opened for (empty if idle).
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Observe connection-state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.tx.subscribe()
    }

    pub fn latest(&self) -> LatestEvent {
        self.projection.latest()
    }

    pub fn history(&self) -> EventHistory {
        self.projection.history()
    }

    pub fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop the stream.
    ///
    /// Synchronously marks the subscription closed so no later frame is
    /// projected, cancels any pending backoff, and asks the background
    /// task to close its transport gracefully. A graceful close never
    /// schedules a reconnect. Safe to call any number of times.
    pub fn teardown(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.projection.close();
        self.state.set(ConnectionState::Closed);
        self.cancel.cancel();
        if self.task.is_some() {
            tracing::info!(path = %self.target, "Subscription torn down");
        }
    }

    /// Tear down and wait for the background task to release its
    /// transport.
    pub async fn shutdown(mut self) {
        self.teardown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(path = %self.target, error = %e, "Stream task ended abnormally");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ---------------------------------------------------------------------------
// Background task
// ---------------------------------------------------------------------------

/// How a connected session ended.
enum SessionEnd {
    /// The consumer tore down; close gracefully and stop.
    Teardown,
    /// The remote end or the network ended it; reconnect.
    Lost(String),
}

struct StreamTask {
    connector: Arc<dyn Connector>,
    url: String,
    policy: ReconnectPolicy,
    projection: Projection,
    state: StateCell,
    cancel: CancellationToken,
}

impl StreamTask {
    /// Connect -> pump frames -> back off -> reconnect, until cancelled.
    ///
    /// Holds at most one transport at a time; it is closed or dropped
    /// before the next connection attempt begins.
    async fn run(self) {
        let mut delay = self.policy.initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return;
            }
            self.state.set(ConnectionState::Connecting);

            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = self.connector.connect(&self.url) => result,
            };

            match connected {
                Ok(mut transport) => {
                    if self.cancel.is_cancelled() {
                        transport.close().await;
                        return;
                    }
                    self.state.set(ConnectionState::Open);
                    tracing::info!(url = %self.url, attempt, "Stream connected");
                    attempt = 0;
                    delay = self.policy.initial_delay;

                    match self.pump(transport.as_mut()).await {
                        SessionEnd::Teardown => {
                            transport.close().await;
                            return;
                        }
                        SessionEnd::Lost(reason) => {
                            tracing::warn!(url = %self.url, reason = %reason, "Stream connection lost");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, attempt, error = %e, "Stream connection failed");
                }
            }

            if self.cancel.is_cancelled() {
                return;
            }
            self.state.set(ConnectionState::ReconnectPending);
            tracing::info!(
                url = %self.url,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after backoff",
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.policy.next_delay(delay);
        }
    }

    /// Project frames until teardown or connection loss.
    async fn pump(&self, transport: &mut dyn Transport) -> SessionEnd {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionEnd::Teardown,
                frame = transport.recv() => frame,
            };

            match frame {
                Some(Ok(frame)) => {
                    let event = normalize(frame);
                    tracing::trace!(url = %self.url, %event, "Frame received");
                    if !self.projection.push(event) {
                        // Torn down while the frame was in flight.
                        return SessionEnd::Teardown;
                    }
                }
                Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                None => return SessionEnd::Lost("closed by remote".to_string()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// StreamSlot
// ---------------------------------------------------------------------------

/// A consumer's hold on at most one subscription.
///
/// [`set_target`](Self::set_target) is idempotent: asking again for the
/// stream already held keeps it (and its history), while a different
/// target tears the old subscription down and starts a fresh one with
/// empty state. Every new subscription bumps the slot's generation.
pub struct StreamSlot {
    connector: Arc<dyn Connector>,
    config: StreamConfig,
    current: Option<Subscription>,
    generation: u64,
}

impl StreamSlot {
    pub fn new(connector: Arc<dyn Connector>, config: StreamConfig) -> Self {
        Self {
            connector,
            config,
            current: None,
            generation: 0,
        }
    }

    /// Make `target` the slot's stream.
    ///
    /// Returns the generation of the subscription now held.
    pub fn set_target(&mut self, target: &str) -> Result<u64, StreamError> {
        if let Some(current) = &self.current {
            if current.is_live() && current.target() == target.trim() {
                return Ok(self.generation);
            }
        }

        self.clear();
        let subscription = Subscription::open(Arc::clone(&self.connector), &self.config, target.trim())?;
        self.generation += 1;
        self.current = Some(subscription);
        Ok(self.generation)
    }

    /// Tear down the held subscription, if any. Idempotent.
    pub fn clear(&mut self) {
        if let Some(mut subscription) = self.current.take() {
            subscription.teardown();
        }
    }

    pub fn current(&self) -> Option<&Subscription> {
        self.current.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for StreamSlot {
    fn drop(&mut self) {
        self.clear();
    }
}
