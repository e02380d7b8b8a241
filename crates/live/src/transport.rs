//! Push-stream transports.
//!
//! [`Connector`] opens one [`Transport`] for a stream URL. The production
//! implementation is [`WsConnector`] (WebSocket over tokio-tungstenite);
//! tests substitute scripted in-memory transports at the same seam.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::event::Frame;

/// Errors raised by the push-stream layer.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream target can never be connected to (bad base URL or path).
    /// Reported once, never retried.
    #[error("Invalid stream target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// Failed to establish a connection.
    #[error("Connection error: {0}")]
    Connect(String),

    /// An established connection failed.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// One live connection delivering frames in order.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next data frame.
    ///
    /// `None` means the remote end closed the connection; `Some(Err(_))`
    /// means it failed. Either way the transport is finished.
    async fn recv(&mut self) -> Option<Result<Frame, StreamError>>;

    /// Close the connection gracefully. Safe to call on a finished
    /// transport.
    async fn close(&mut self);
}

/// Factory for transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, StreamError>;
}

/// Derive the stream URL for `path` from an HTTP(S) or WS(S) base URL.
///
/// `http` becomes `ws` and `https` becomes `wss`; the path is appended
/// to the base (whose own path prefix is kept).
pub fn stream_url(base_url: &str, path: &str) -> Result<String, StreamError> {
    let invalid = |reason: String| StreamError::InvalidTarget {
        target: path.to_string(),
        reason,
    };

    let base = base_url.trim().trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(invalid(format!(
            "base URL '{base_url}' must use http, https, ws or wss"
        )));
    };

    let url = if path.starts_with('/') {
        format!("{ws_base}{path}")
    } else {
        format!("{ws_base}/{path}")
    };

    let parsed = reqwest::Url::parse(&url).map_err(|e| invalid(format!("{url}: {e}")))?;
    if parsed.host_str().is_none() {
        return Err(invalid(format!("{url}: missing host")));
    }
    Ok(parsed.to_string())
}

// ---------------------------------------------------------------------------
// WebSocket implementation
// ---------------------------------------------------------------------------

/// How long a graceful close waits for the peer's close acknowledgement.
const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens WebSocket transports with tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

/// A live WebSocket connection.
pub struct WsTransport {
    ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    finished: bool,
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, StreamError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| StreamError::Connect(format!("Failed to connect to {url}: {e}")))?;

        tracing::debug!(url, "WebSocket handshake complete");

        Ok(Box::new(WsTransport {
            ws_stream,
            finished: false,
        }))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<Result<Frame, StreamError>> {
        if self.finished {
            return None;
        }
        while let Some(msg_result) = self.ws_stream.next().await {
            match msg_result {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(bytes)) => return Some(Ok(Frame::Binary(bytes))),
                Ok(Message::Ping(_) | Message::Pong(_)) => {
                    // Handled automatically by tungstenite.
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "Remote closed WebSocket");
                    break;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    self.finished = true;
                    return Some(Err(StreamError::Transport(e.to_string())));
                }
            }
        }
        self.finished = true;
        None
    }

    async fn close(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "subscription closed".into(),
        };
        if let Err(e) = self.ws_stream.close(Some(frame)).await {
            tracing::debug!(error = %e, "WebSocket close handshake failed");
        }
        // Drain until the peer acknowledges so the socket shuts down cleanly.
        let drain = async { while let Some(Ok(_)) = self.ws_stream.next().await {} };
        if tokio::time::timeout(CLOSE_ACK_TIMEOUT, drain).await.is_err() {
            tracing::debug!("Peer did not acknowledge close in time");
        }
    }
}
