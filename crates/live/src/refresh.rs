//! Periodic pull refresh that composes with push updates.
//!
//! A [`RefreshCoordinator`] owns a set of slices, each bound to one API
//! path. On every tick it pulls all of them concurrently; each slice is
//! updated independently, so one failing or stuck request never holds
//! back the others. The displayed value of a slice is a [`Displayed`]:
//!
//! - a push (see [`SliceHandle::push`]) replaces it immediately;
//! - a pull result replaces it only if it comes from a tick issued after
//!   the most recent push and after the last pull already applied.
//!
//! So a slow response can never overwrite newer data, and a push stays
//! on screen until the next tick's result lands.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dataflow_api_client::{ApiClient, ApiError};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default cadence between pull ticks.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest cadence accepted; `tokio::time::interval` rejects zero.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(1);

/// Something that can fetch JSON by path.
#[async_trait]
pub trait PullSource: Send + Sync + 'static {
    async fn pull(&self, path: &str) -> Result<serde_json::Value, ApiError>;
}

#[async_trait]
impl PullSource for ApiClient {
    async fn pull(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        self.get_value(path).await
    }
}

// ---------------------------------------------------------------------------
// Displayed value
// ---------------------------------------------------------------------------

/// Where the displayed value of a slice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Result of the pull issued on tick number `tick` (1-based).
    Pull { tick: u64 },
    /// A push update.
    Push,
}

/// The merged pull/push state of one slice.
#[derive(Debug, Clone)]
pub struct Displayed<T> {
    value: Option<T>,
    origin: Option<Origin>,
    last_pull_tick: u64,
    push_barrier: u64,
    closed: bool,
}

impl<T> Displayed<T> {
    fn new() -> Self {
        Self {
            value: None,
            origin: None,
            last_pull_tick: 0,
            push_barrier: 0,
            closed: false,
        }
    }

    /// The value to display, or `None` before the first pull or push.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn origin(&self) -> Option<Origin> {
        self.origin
    }

    fn accept_pull(&mut self, tick: u64, value: T) -> bool {
        if self.closed || tick <= self.last_pull_tick || tick <= self.push_barrier {
            return false;
        }
        self.last_pull_tick = tick;
        self.value = Some(value);
        self.origin = Some(Origin::Pull { tick });
        true
    }

    /// `issued_ticks` is the number of ticks issued when the push arrived;
    /// their results are now older than the pushed value.
    fn accept_push(&mut self, issued_ticks: u64, value: T) -> bool {
        if self.closed {
            return false;
        }
        self.push_barrier = self.push_barrier.max(issued_ticks);
        self.value = Some(value);
        self.origin = Some(Origin::Push);
        true
    }
}

// ---------------------------------------------------------------------------
// Slices
// ---------------------------------------------------------------------------

/// Handle to one refreshed slice of displayed state.
///
/// Cheap to clone; all clones share the same state.
pub struct SliceHandle<T> {
    name: Arc<str>,
    path: Arc<str>,
    tx: Arc<watch::Sender<Displayed<T>>>,
    clock: Arc<AtomicU64>,
}

impl<T> Clone for SliceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            path: Arc::clone(&self.path),
            tx: Arc::clone(&self.tx),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SliceHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The value currently displayed.
    pub fn current(&self) -> Option<T> {
        self.tx.borrow().value().cloned()
    }

    pub fn origin(&self) -> Option<Origin> {
        self.tx.borrow().origin()
    }

    /// Observe every change to the displayed value.
    pub fn subscribe(&self) -> watch::Receiver<Displayed<T>> {
        self.tx.subscribe()
    }

    /// Display a pushed value. It takes precedence over every pull issued
    /// so far. Returns `false` once the coordinator has stopped.
    pub fn push(&self, value: T) -> bool {
        let issued = self.clock.load(Ordering::SeqCst);
        self.tx
            .send_if_modified(|displayed| displayed.accept_push(issued, value))
    }

    fn apply_pull(&self, tick: u64, value: T) -> bool {
        self.tx
            .send_if_modified(|displayed| displayed.accept_pull(tick, value))
    }
}

/// Type-erased view of a slice used by the tick loop.
trait PullTarget: Send + Sync {
    fn name(&self) -> &str;
    fn path(&self) -> &str;
    /// Decode and apply one pull result. `Ok(false)` means it was stale.
    fn apply(&self, tick: u64, value: serde_json::Value) -> Result<bool, serde_json::Error>;
    fn close(&self);
}

impl<T> PullTarget for SliceHandle<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn apply(&self, tick: u64, value: serde_json::Value) -> Result<bool, serde_json::Error> {
        let typed = T::deserialize(value)?;
        Ok(self.apply_pull(tick, typed))
    }

    fn close(&self) {
        self.tx.send_if_modified(|displayed| {
            displayed.closed = true;
            false
        });
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Builder for a set of periodically refreshed slices.
pub struct RefreshCoordinator {
    source: Arc<dyn PullSource>,
    interval: Duration,
    clock: Arc<AtomicU64>,
    targets: Vec<Arc<dyn PullTarget>>,
}

impl RefreshCoordinator {
    pub fn new(source: Arc<dyn PullSource>, interval: Duration) -> Self {
        Self {
            source,
            interval: interval.max(MIN_REFRESH_INTERVAL),
            clock: Arc::new(AtomicU64::new(0)),
            targets: Vec::new(),
        }
    }

    /// Register a slice refreshed from `path`.
    pub fn track<T>(&mut self, name: &str, path: &str) -> SliceHandle<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let (tx, _rx) = watch::channel(Displayed::new());
        let slice = SliceHandle {
            name: Arc::from(name),
            path: Arc::from(path),
            tx: Arc::new(tx),
            clock: Arc::clone(&self.clock),
        };
        self.targets.push(Arc::new(slice.clone()));
        slice
    }

    /// Start ticking. The first tick fires immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> RefreshHandle {
        let shared = Arc::new(RefreshShared {
            source: self.source,
            targets: self.targets,
            clock: self.clock,
            cancel: CancellationToken::new(),
            consumers: AtomicUsize::new(1),
        });

        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            slices = shared.targets.len(),
            "Refresh coordinator started",
        );

        let loop_shared = Arc::clone(&shared);
        let interval = self.interval;
        tokio::spawn(async move {
            loop_shared.run(interval).await;
        });

        RefreshHandle {
            shared,
            released: false,
        }
    }
}

struct RefreshShared {
    source: Arc<dyn PullSource>,
    targets: Vec<Arc<dyn PullTarget>>,
    clock: Arc<AtomicU64>,
    cancel: CancellationToken,
    consumers: AtomicUsize,
}

impl RefreshShared {
    async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("Refresh coordinator stopping");
                    break;
                }
                _ = ticker.tick() => self.issue_tick(),
            }
        }
    }

    /// Pull every slice concurrently, each in its own task.
    fn issue_tick(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        let tick = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(tick, slices = self.targets.len(), "Refresh tick");

        for target in &self.targets {
            let target = Arc::clone(target);
            let source = Arc::clone(&self.source);
            let cancel = self.cancel.clone();

            tokio::spawn(async move {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    result = source.pull(target.path()) => result,
                };
                if cancel.is_cancelled() {
                    return;
                }

                match result {
                    Ok(value) => match target.apply(tick, value) {
                        Ok(true) => tracing::debug!(slice = target.name(), tick, "Slice refreshed"),
                        Ok(false) => {
                            tracing::debug!(slice = target.name(), tick, "Discarded superseded pull result")
                        }
                        Err(e) => tracing::warn!(
                            slice = target.name(),
                            tick,
                            error = %e,
                            "Pull result did not match the slice shape; keeping previous value",
                        ),
                    },
                    Err(e) => tracing::warn!(
                        slice = target.name(),
                        tick,
                        error = %e,
                        "Refresh pull failed; keeping previous value",
                    ),
                }
            });
        }
    }

    fn stop(&self) {
        self.cancel.cancel();
        for target in &self.targets {
            target.close();
        }
    }
}

/// A consumer's hold on a running coordinator.
///
/// Clones count as additional consumers. The coordinator stops (timer
/// cancelled, in-flight results discarded) when the last consumer calls
/// [`teardown`](Self::teardown) or drops its handle.
pub struct RefreshHandle {
    shared: Arc<RefreshShared>,
    released: bool,
}

impl RefreshHandle {
    pub fn is_running(&self) -> bool {
        !self.shared.cancel.is_cancelled()
    }

    /// Number of handles still holding the coordinator.
    pub fn consumers(&self) -> usize {
        self.shared.consumers.load(Ordering::SeqCst)
    }

    /// Number of ticks issued so far.
    pub fn ticks(&self) -> u64 {
        self.shared.clock.load(Ordering::SeqCst)
    }

    /// Issue an extra tick right now, outside the regular cadence.
    pub fn refresh_now(&self) {
        self.shared.issue_tick();
    }

    /// Release this consumer. Idempotent.
    pub fn teardown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.shared.consumers.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.stop();
        }
    }
}

impl Clone for RefreshHandle {
    fn clone(&self) -> Self {
        self.shared.consumers.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: Arc::clone(&self.shared),
            released: false,
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}
