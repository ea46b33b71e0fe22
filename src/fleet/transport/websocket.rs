// ABOUTME: WebSocket transport built on tokio-tungstenite
//
// Dials the route (direct or HTTP CONNECT tunnel), performs the TLS and
// WebSocket handshakes, then runs one pump task per session that writes
// queued text frames and watches the socket for close or error. Inbound
// frames are not interpreted.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::{proxy, OpenFuture, Session, SessionEnd, SessionId, Target, Transport, TransportError};
use crate::fleet::route::EgressRoute;

/// Default bound on queued outbound frames per session
pub const DEFAULT_SEND_QUEUE: usize = 64;

/// How long teardown waits for session pumps to send their close frames
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Production transport speaking WebSocket (optionally over TLS)
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    send_queue: usize,
    sessions: TaskTracker,
}

impl WebSocketTransport {
    /// Create a transport whose sessions buffer up to `send_queue` frames
    pub fn new(send_queue: usize) -> Self {
        Self {
            send_queue: send_queue.max(1),
            sessions: TaskTracker::new(),
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_QUEUE)
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, target: &Target, route: &EgressRoute) -> Result<OpenFuture, TransportError> {
        let request = target
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let target = target.clone();
        let route = route.clone();
        let send_queue = self.send_queue;
        let sessions = self.sessions.clone();

        Ok(Box::pin(async move {
            let stream = proxy::dial(&target, &route).await?;
            stream.set_nodelay(true).map_err(TransportError::Connect)?;

            let (socket, response) = tokio_tungstenite::client_async_tls(request, stream)
                .await
                .map_err(|e| TransportError::Handshake(e.to_string()))?;

            debug!(
                endpoint = %target,
                route = %route,
                status = %response.status(),
                "WebSocket handshake complete"
            );

            Ok(spawn_session(&sessions, socket, send_queue))
        }))
    }

    fn shutdown(&self) -> BoxFuture<'static, ()> {
        let sessions = self.sessions.clone();
        Box::pin(async move {
            sessions.close();
            if tokio::time::timeout(CLOSE_GRACE, sessions.wait()).await.is_err() {
                warn!(
                    remaining = sessions.len(),
                    "Session pumps did not finish before close grace period"
                );
            }
        })
    }
}

/// Start the pump task for an established socket and return its session handle
fn spawn_session<S>(tracker: &TaskTracker, socket: WebSocketStream<S>, send_queue: usize) -> Session
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = SessionId::new();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(send_queue);
    let (ended_tx, ended_rx) = oneshot::channel();
    let (mut sink, mut stream) = socket.split();

    tracker.spawn(async move {
        let end = loop {
            tokio::select! {
                frame = outbound_rx.recv() => match frame {
                    Some(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            break SessionEnd::Failed(TransportError::Stream(e.to_string()));
                        }
                    }
                    None => {
                        // Owner dropped the session: close politely
                        let _ = sink.send(Message::Close(None)).await;
                        break SessionEnd::Closed;
                    }
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None => break SessionEnd::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        break SessionEnd::Failed(TransportError::Stream(e.to_string()));
                    }
                },
            }
        };

        debug!(session = %id, "Session pump finished");
        let _ = ended_tx.send(end);
    });

    Session::new(id, outbound_tx, ended_rx)
}
