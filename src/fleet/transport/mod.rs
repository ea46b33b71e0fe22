// ABOUTME: Transport seam between connections and the socket substrate
//
// A transport turns (target, route) into a live Session in two steps:
// a synchronous request build that can reject bad input immediately, and an
// asynchronous open future that resolves once the handshake completes.
// Sessions expose a bounded outbound queue and a one-shot end notification.

pub mod proxy;
pub mod websocket;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use url::Url;
use uuid::Uuid;

use super::route::EgressRoute;

pub use websocket::WebSocketTransport;

/// Errors raised while opening or using a session
#[derive(Debug, Error)]
pub enum TransportError {
    /// Target address is malformed or unsupported
    #[error("Invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// Request could not be constructed
    #[error("Failed to build request: {0}")]
    Request(String),

    /// TCP connect to the target or proxy failed
    #[error("Connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Proxy did not establish the tunnel
    #[error("Proxy {proxy} refused tunnel: {status}")]
    ProxyRefused { proxy: String, status: String },

    /// WebSocket/TLS handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Handshake did not finish in time
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Session is no longer accepting frames
    #[error("Session closed")]
    SessionClosed,

    /// Outbound queue is full
    #[error("Send queue full ({capacity} frames)")]
    SendQueueFull { capacity: usize },

    /// Error on an established stream
    #[error("Stream error: {0}")]
    Stream(String),
}

/// Remote endpoint every connection dials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
    host: String,
    port: u16,
}

impl Target {
    /// Parse and validate a `ws://` or `wss://` address
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let invalid = |reason: String| TransportError::InvalidTarget {
            target: raw.to_string(),
            reason,
        };

        let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(invalid(format!(
                    "unsupported scheme '{other}', expected ws or wss"
                )))
            }
        }

        let host = match url.host() {
            Some(url::Host::Ipv6(addr)) => addr.to_string(),
            Some(host) => host.to_string(),
            None => return Err(invalid("missing host".to_string())),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port".to_string()))?;

        Ok(Self { url, host, port })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Host suitable for socket connect (IPv6 without brackets)
    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` as used in a `CONNECT` request line
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl FromStr for Target {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Identity of one live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Orderly close by either side
    Closed,
    /// Transport error mid-session
    Failed(TransportError),
}

/// Handle to an open session
///
/// Dropping the handle closes the outbound queue, which tells the transport
/// to close the socket.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    outbound: mpsc::Sender<String>,
    ended: Option<oneshot::Receiver<SessionEnd>>,
}

impl Session {
    /// Assemble a session from its outbound queue and end notification
    pub const fn new(
        id: SessionId,
        outbound: mpsc::Sender<String>,
        ended: oneshot::Receiver<SessionEnd>,
    ) -> Self {
        Self {
            id,
            outbound,
            ended: Some(ended),
        }
    }

    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a text frame without waiting
    pub fn send_text(&self, payload: &str) -> Result<(), TransportError> {
        self.outbound
            .try_send(payload.to_string())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::SendQueueFull {
                    capacity: self.outbound.max_capacity(),
                },
                mpsc::error::TrySendError::Closed(_) => TransportError::SessionClosed,
            })
    }

    /// Take the end notification (for spawning a watcher task)
    ///
    /// This can only be called once - subsequent calls return None.
    pub fn take_ended(&mut self) -> Option<oneshot::Receiver<SessionEnd>> {
        self.ended.take()
    }
}

/// Future that resolves once the open handshake finishes
pub type OpenFuture = BoxFuture<'static, Result<Session, TransportError>>;

/// Socket substrate used by every connection
pub trait Transport: Send + Sync + 'static {
    /// Build an open request for `target` over `route`
    ///
    /// Returning `Err` means the request could not even be constructed;
    /// the returned future carries handshake failures.
    fn open(&self, target: &Target, route: &EgressRoute) -> Result<OpenFuture, TransportError>;

    /// Release transport-owned background work during teardown
    fn shutdown(&self) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }
}
