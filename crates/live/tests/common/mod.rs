#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use dataflow_api_client::ApiError;
use dataflow_live::{Connector, EventHistory, Frame, PullSource, StreamError, Transport};

/// Upper bound for any wait in a test. Under a paused clock this only
/// costs virtual time.
pub const WAIT_LIMIT: Duration = Duration::from_secs(120);

/// Let spawned tasks run without moving the clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Wait until `history` holds at least `count` events.
pub async fn wait_for_events(history: &mut EventHistory, count: usize) {
    tokio::time::timeout(WAIT_LIMIT, async {
        while history.len() < count {
            if !history.changed().await {
                break;
            }
        }
    })
    .await
    .expect("timed out waiting for events");
    assert!(history.len() >= count, "projection ended before {count} events");
}

// ---------------------------------------------------------------------------
// Scripted connector
// ---------------------------------------------------------------------------

enum Step {
    Frame(Frame),
    Fail(String),
}

/// In-memory [`Connector`] driven by the test.
///
/// Every successful connect hands out a transport whose frames the test
/// feeds through [`send_text`](Self::send_text); connections are indexed
/// in the order they were opened.
pub struct ScriptedConnector {
    failures_remaining: AtomicUsize,
    attempts: Mutex<Vec<(String, Instant)>>,
    senders: Mutex<Vec<Option<mpsc::UnboundedSender<Step>>>>,
    connected: watch::Sender<usize>,
    open: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    graceful_closes: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        let (connected, _rx) = watch::channel(0);
        Arc::new(Self {
            failures_remaining: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
            connected,
            open: Arc::new(AtomicUsize::new(0)),
            max_open: Arc::new(AtomicUsize::new(0)),
            graceful_closes: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Instants of every connection attempt, failed ones included.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn attempted_urls(&self) -> Vec<String> {
        self.attempts.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    /// Number of successful connections so far.
    pub fn connections(&self) -> usize {
        *self.connected.borrow()
    }

    pub async fn wait_for_connections(&self, count: usize) {
        let mut rx = self.connected.subscribe();
        tokio::time::timeout(WAIT_LIMIT, rx.wait_for(|c| *c >= count))
            .await
            .expect("timed out waiting for connection")
            .expect("connector dropped");
    }

    pub fn send_text(&self, connection: usize, text: &str) -> bool {
        self.send(connection, Step::Frame(Frame::Text(text.to_string())))
    }

    pub fn send_binary(&self, connection: usize, bytes: &[u8]) -> bool {
        self.send(connection, Step::Frame(Frame::Binary(bytes.to_vec())))
    }

    /// Make the connection fail with a transport error.
    pub fn fail_transport(&self, connection: usize, reason: &str) -> bool {
        self.send(connection, Step::Fail(reason.to_string()))
    }

    /// Close the connection from the remote end.
    pub fn drop_remote(&self, connection: usize) {
        if let Some(slot) = self.senders.lock().unwrap().get_mut(connection) {
            slot.take();
        }
    }

    pub fn open_transports(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_open_transports(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn graceful_closes(&self) -> usize {
        self.graceful_closes.load(Ordering::SeqCst)
    }

    fn send(&self, connection: usize, step: Step) -> bool {
        let senders = self.senders.lock().unwrap();
        match senders.get(connection).and_then(Option::as_ref) {
            Some(tx) => tx.send(step).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, StreamError> {
        self.attempts
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let refused = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(StreamError::Connect("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(Some(tx));

        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now_open, Ordering::SeqCst);
        self.connected.send_modify(|c| *c += 1);

        Ok(Box::new(ScriptedTransport {
            rx,
            open: Arc::clone(&self.open),
            graceful_closes: Arc::clone(&self.graceful_closes),
        }))
    }
}

struct ScriptedTransport {
    rx: mpsc::UnboundedReceiver<Step>,
    open: Arc<AtomicUsize>,
    graceful_closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn recv(&mut self) -> Option<Result<Frame, StreamError>> {
        match self.rx.recv().await? {
            Step::Frame(frame) => Some(Ok(frame)),
            Step::Fail(reason) => Some(Err(StreamError::Transport(reason))),
        }
    }

    async fn close(&mut self) {
        self.graceful_closes.fetch_add(1, Ordering::SeqCst);
        self.rx.close();
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Fake pull source
// ---------------------------------------------------------------------------

struct Reply {
    delay: Duration,
    result: Result<Value, u16>,
}

/// [`PullSource`] answering from per-path queues of scripted replies.
///
/// A path with no queued reply answers `503`.
pub struct FakeSource {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn reply(&self, path: &str, value: Value) {
        self.reply_after(path, Duration::ZERO, value);
    }

    pub fn reply_after(&self, path: &str, delay: Duration, value: Value) {
        self.queue(path, Reply { delay, result: Ok(value) });
    }

    pub fn fail(&self, path: &str, status: u16) {
        self.queue(path, Reply { delay: Duration::ZERO, result: Err(status) });
    }

    pub fn calls(&self, path: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, at)| *at)
            .collect()
    }

    fn queue(&self, path: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }
}

#[async_trait]
impl PullSource for FakeSource {
    async fn pull(&self, path: &str) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push((path.to_string(), Instant::now()));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(VecDeque::pop_front);

        let Some(reply) = reply else {
            return Err(ApiError::Status {
                status: 503,
                message: "no scripted reply".to_string(),
            });
        };
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result.map_err(|status| ApiError::Status {
            status,
            message: "scripted failure".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// In-process server
// ---------------------------------------------------------------------------

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
