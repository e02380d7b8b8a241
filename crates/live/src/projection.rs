//! Per-subscription event state.
//!
//! A [`Projection`] owns the ordered history of events received by one
//! subscription. Consumers read it through two reactive views:
//! [`LatestEvent`] for "current status" displays and [`EventHistory`] for
//! log-style displays. Both views observe the same atomically published
//! state, so the latest event is always the tail of the history.

use std::sync::Arc;

use tokio::sync::watch;

use crate::event::Event;

/// The published state shared by both views.
#[derive(Debug, Default)]
pub struct ProjectionState {
    events: Vec<Event>,
    closed: bool,
}

impl ProjectionState {
    /// The most recently appended event.
    pub fn latest(&self) -> Option<&Event> {
        self.events.last()
    }

    /// Every event in arrival order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Writer side of a subscription's event state.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct Projection {
    tx: Arc<watch::Sender<ProjectionState>>,
}

impl Projection {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProjectionState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Append one event and publish it as the latest.
    ///
    /// Returns `false` (leaving the state untouched) once the projection
    /// has been closed.
    pub fn push(&self, event: Event) -> bool {
        self.tx.send_if_modified(|state| {
            if state.closed {
                return false;
            }
            state.events.push(event);
            true
        })
    }

    /// Stop accepting events. Idempotent; existing events stay readable.
    pub fn close(&self) {
        self.tx.send_if_modified(|state| {
            state.closed = true;
            false
        });
    }

    pub fn is_closed(&self) -> bool {
        self.tx.borrow().closed
    }

    pub fn latest(&self) -> LatestEvent {
        LatestEvent {
            rx: self.tx.subscribe(),
        }
    }

    pub fn history(&self) -> EventHistory {
        EventHistory {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the most recent event.
#[derive(Clone)]
pub struct LatestEvent {
    rx: watch::Receiver<ProjectionState>,
}

impl LatestEvent {
    /// The current latest event, or `None` if nothing has arrived yet.
    pub fn get(&self) -> Option<Event> {
        self.rx.borrow().latest().cloned()
    }

    /// Wait for the next event and return it.
    ///
    /// Returns `None` once the owning subscription is gone.
    pub async fn changed(&mut self) -> Option<Event> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().latest().cloned()
    }
}

/// Read-only view of the full, ordered event history.
#[derive(Clone)]
pub struct EventHistory {
    rx: watch::Receiver<ProjectionState>,
}

impl EventHistory {
    /// Copy of every event received so far.
    pub fn snapshot(&self) -> Vec<Event> {
        self.rx.borrow().events().to_vec()
    }

    /// Events appended after the first `offset` ones.
    pub fn since(&self, offset: usize) -> Vec<Event> {
        self.rx
            .borrow()
            .events()
            .get(offset..)
            .map(<[Event]>::to_vec)
            .unwrap_or_default()
    }

    /// Borrow the state without copying. Keep the closure short: writers
    /// wait while it runs.
    pub fn with<R>(&self, f: impl FnOnce(&ProjectionState) -> R) -> R {
        f(&self.rx.borrow())
    }

    pub fn len(&self) -> usize {
        self.rx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.borrow().is_empty()
    }

    /// Wait until at least one more event has been appended.
    ///
    /// Returns `false` once the owning subscription is gone.
    pub async fn changed(&mut self) -> bool {
        let changed = self.rx.changed().await.is_ok();
        self.rx.borrow_and_update();
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opaque(text: &str) -> Event {
        Event::Opaque(text.into())
    }

    #[test]
    fn starts_empty() {
        let projection = Projection::new();
        assert!(projection.latest().get().is_none());
        assert!(projection.history().is_empty());
    }

    #[test]
    fn latest_is_always_tail_of_history() {
        let projection = Projection::new();
        let latest = projection.latest();
        let history = projection.history();

        let events = [
            opaque("line1"),
            Event::Structured(json!({"level": "info", "msg": "line2"})),
            opaque("line3"),
            opaque("line3"),
        ];
        for (i, event) in events.iter().enumerate() {
            assert!(projection.push(event.clone()));
            assert_eq!(history.len(), i + 1);
            assert_eq!(latest.get().as_ref(), history.snapshot().last());
            history.with(|state| assert_eq!(state.latest(), state.events().last()));
        }
        assert_eq!(history.snapshot(), events.to_vec());
    }

    #[test]
    fn closed_projection_ignores_pushes() {
        let projection = Projection::new();
        projection.push(opaque("before"));
        projection.close();
        projection.close();

        assert!(projection.is_closed());
        assert!(!projection.push(opaque("after")));
        assert_eq!(projection.history().snapshot(), vec![opaque("before")]);
        assert_eq!(projection.latest().get(), Some(opaque("before")));
    }

    #[test]
    fn since_returns_only_new_events() {
        let projection = Projection::new();
        let history = projection.history();
        projection.push(opaque("a"));
        projection.push(opaque("b"));
        projection.push(opaque("c"));

        assert_eq!(history.since(1), vec![opaque("b"), opaque("c")]);
        assert!(history.since(3).is_empty());
        assert!(history.since(10).is_empty());
    }

    #[tokio::test]
    async fn views_are_notified_on_push() {
        let projection = Projection::new();
        let mut latest = projection.latest();
        let mut history = projection.history();

        projection.push(opaque("line1"));

        assert_eq!(latest.changed().await, Some(opaque("line1")));
        assert!(history.changed().await);
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn close_does_not_wake_views() {
        let projection = Projection::new();
        let mut latest = projection.latest();
        projection.close();

        let woke = tokio::time::timeout(std::time::Duration::from_millis(20), latest.changed()).await;
        assert!(woke.is_err());
    }

    #[tokio::test]
    async fn views_end_when_writer_is_dropped() {
        let projection = Projection::new();
        let mut latest = projection.latest();
        let mut history = projection.history();
        drop(projection);

        assert_eq!(latest.changed().await, None);
        assert!(!history.changed().await);
    }
}
