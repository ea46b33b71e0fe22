// ABOUTME: A single self-healing connection with keepalive and bounded reconnect
//
// Each Connection is an actor task owning all of its mutable state: the
// lifecycle, the live session, and at most one reconnect timer plus one
// keepalive timer. Timer fires, open results and session ends arrive as
// events on the actor's own channel, so callbacks for one connection never
// run concurrently. Events tagged with an older epoch belong to a previous
// session and are discarded.

use std::fmt;
use std::ops::ControlFlow;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::ConnectionConfig;
use super::context::FleetContext;
use super::route::EgressRoute;
use super::state::{ConnectDecision, ConnectionState, Lifecycle};
use super::timer::TimerHandle;
use super::transport::{Session, SessionEnd, SessionId, Target, TransportError};

// === Connection ID ===

/// Unique identifier for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Generate a new unique connection ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// === Status ===

/// Observable snapshot of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub attempts: u32,
    pub session: Option<SessionId>,
}

// === Events ===

enum ConnectionEvent {
    Opened { epoch: u64, session: Session },
    OpenFailed { epoch: u64, error: TransportError },
    SessionEnded { epoch: u64, end: SessionEnd },
    ReconnectDue,
    KeepaliveDue { epoch: u64 },
}

// === Connection handle ===

/// Pool-side handle to a running connection
///
/// The connection drives itself; the handle only exposes its identity,
/// its fixed route and its status.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    index: usize,
    route: EgressRoute,
    status: watch::Receiver<ConnectionStatus>,
}

impl Connection {
    /// Create a connection and issue its first connect immediately
    pub fn spawn(
        ctx: &FleetContext,
        index: usize,
        target: Target,
        route: EgressRoute,
        config: ConnectionConfig,
    ) -> Self {
        let id = ConnectionId::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let lifecycle = Lifecycle::new(config.max_reconnect_attempts);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus {
            state: lifecycle.state(),
            attempts: lifecycle.attempts(),
            session: None,
        });

        ctx.metrics().connection_created();
        debug!(connection = %id, index, endpoint = %target, route = %route, "Creating connection");

        let mut actor = ConnectionActor {
            id,
            target,
            route: route.clone(),
            config,
            ctx: ctx.clone(),
            lifecycle,
            session: None,
            epoch: 0,
            reconnect_timer: None,
            keepalive_timer: None,
            events: events_tx,
            status: status_tx,
        };

        actor.connect();
        ctx.spawn(actor.run(events_rx));

        Self {
            id,
            index,
            route,
            status: status_rx,
        }
    }

    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Creation order within the pool
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Route assigned at creation, reused by every reconnect
    pub const fn route(&self) -> &EgressRoute {
        &self.route
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn attempts(&self) -> u32 {
        self.status.borrow().attempts
    }

    /// Receiver that observes every status change
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

// === Actor ===

struct ConnectionActor {
    id: ConnectionId,
    target: Target,
    route: EgressRoute,
    config: ConnectionConfig,
    ctx: FleetContext,
    lifecycle: Lifecycle,
    session: Option<Session>,
    /// Bumped on every open request; tags events from that attempt
    epoch: u64,
    reconnect_timer: Option<TimerHandle>,
    keepalive_timer: Option<TimerHandle>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    status: watch::Sender<ConnectionStatus>,
}

impl ConnectionActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<ConnectionEvent>) {
        let shutdown = self.ctx.shutdown_token().clone();

        while !self.lifecycle.is_dormant() {
            let event = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                event = inbox.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event);
        }

        self.release();
    }

    fn handle(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened { epoch, session } => self.on_open(epoch, session),
            ConnectionEvent::OpenFailed { epoch, error } => {
                if epoch == self.epoch {
                    warn!(
                        connection = %self.id,
                        attempt = self.lifecycle.attempts(),
                        error = %error,
                        "Connection attempt failed"
                    );
                    self.on_lost();
                }
            }
            ConnectionEvent::SessionEnded { epoch, end } => {
                if epoch == self.epoch {
                    match end {
                        SessionEnd::Closed => info!(connection = %self.id, "Connection closed"),
                        SessionEnd::Failed(e) => {
                            warn!(connection = %self.id, error = %e, "Connection failed");
                        }
                    }
                    self.on_lost();
                }
            }
            ConnectionEvent::ReconnectDue => {
                self.reconnect_timer = None;
                if self.lifecycle.state() == ConnectionState::ReconnectPending {
                    self.connect();
                }
            }
            ConnectionEvent::KeepaliveDue { epoch } => self.on_keepalive(epoch),
        }
    }

    /// Count an attempt and issue the open request, or go dormant
    fn connect(&mut self) {
        let attempt = match self.lifecycle.begin_connect() {
            ConnectDecision::Open { attempt } => attempt,
            ConnectDecision::Dormant { attempts } => {
                if let Some(timer) = self.reconnect_timer.take() {
                    timer.cancel();
                }
                self.ctx.metrics().connection_dormant();
                info!(
                    connection = %self.id,
                    attempts,
                    max = self.lifecycle.max_attempts(),
                    "Reconnect attempts exhausted, connection is dormant"
                );
                self.publish();
                return;
            }
        };

        self.epoch += 1;
        let epoch = self.epoch;
        self.ctx.metrics().open_attempted();
        debug!(connection = %self.id, attempt, route = %self.route, "Connecting");

        match self.ctx.transport().open(&self.target, &self.route) {
            Ok(pending) => {
                let events = self.events.clone();
                let timeout = self.config.connect_timeout;
                let shutdown = self.ctx.shutdown_token().clone();

                self.ctx.spawn(async move {
                    let event = tokio::select! {
                        biased;
                        () = shutdown.cancelled() => return,
                        result = tokio::time::timeout(timeout, pending) => match result {
                            Ok(Ok(session)) => ConnectionEvent::Opened { epoch, session },
                            Ok(Err(error)) => ConnectionEvent::OpenFailed { epoch, error },
                            Err(_) => ConnectionEvent::OpenFailed {
                                epoch,
                                error: TransportError::HandshakeTimeout(timeout),
                            },
                        },
                    };
                    let _ = events.send(event);
                });
                self.publish();
            }
            Err(e) => {
                // Construction failures consume the attempt and retry like any other failure
                self.ctx.metrics().construction_failed();
                error!(connection = %self.id, attempt, error = %e, "Socket error");
                self.on_lost();
            }
        }
    }

    fn on_open(&mut self, epoch: u64, mut session: Session) {
        if epoch != self.epoch || !self.lifecycle.opened() {
            debug!(connection = %self.id, "Discarding stale session");
            return;
        }

        info!(connection = %self.id, session = %session.id(), route = %self.route, "Connected");

        if let Some(ended) = session.take_ended() {
            let events = self.events.clone();
            let shutdown = self.ctx.shutdown_token().clone();
            self.ctx.spawn(async move {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => {}
                    end = ended => {
                        let end = end.unwrap_or(SessionEnd::Closed);
                        let _ = events.send(ConnectionEvent::SessionEnded { epoch, end });
                    }
                }
            });
        }

        self.session = Some(session);
        self.ctx.metrics().connection_opened();
        self.schedule_keepalive();
        self.publish();
    }

    /// Shared path for failed opens, closes and mid-session failures
    fn on_lost(&mut self) {
        if !self.lifecycle.lost() {
            return;
        }

        if let Some(timer) = self.keepalive_timer.take() {
            timer.cancel();
        }
        if self.session.take().is_some() {
            self.ctx.metrics().connection_lost();
        }

        self.schedule_reconnect();
        self.publish();
    }

    fn schedule_reconnect(&mut self) {
        if let Some(previous) = self.reconnect_timer.take() {
            previous.cancel();
        }

        let events = self.events.clone();
        let armed = self.ctx.timers().once(self.config.reconnect_interval, move || {
            let _ = events.send(ConnectionEvent::ReconnectDue);
        });

        match armed {
            Ok(timer) => {
                self.ctx.metrics().reconnect_scheduled();
                debug!(
                    connection = %self.id,
                    delay_ms = self.config.reconnect_interval.as_millis(),
                    "Reconnect scheduled"
                );
                self.reconnect_timer = Some(timer);
            }
            Err(e) => {
                error!(connection = %self.id, error = %e, "Reconnect timer failed");
            }
        }
    }

    fn schedule_keepalive(&mut self) {
        if let Some(previous) = self.keepalive_timer.take() {
            previous.cancel();
        }

        let events = self.events.clone();
        let epoch = self.epoch;
        let armed = self.ctx.timers().every(self.config.keepalive_interval, move || {
            if events.send(ConnectionEvent::KeepaliveDue { epoch }).is_ok() {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(())
            }
        });

        match armed {
            Ok(timer) => self.keepalive_timer = Some(timer),
            Err(e) => {
                error!(connection = %self.id, error = %e, "Message timer failed");
            }
        }
    }

    fn on_keepalive(&mut self, epoch: u64) {
        if epoch != self.epoch {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };

        match session.send_text(&self.config.keepalive_payload) {
            Ok(()) => self.ctx.metrics().keepalive_sent(),
            Err(e) => {
                self.ctx.metrics().send_failed();
                warn!(connection = %self.id, session = %session.id(), error = %e, "Send failed");
            }
        }
    }

    fn publish(&self) {
        self.status.send_replace(ConnectionStatus {
            state: self.lifecycle.state(),
            attempts: self.lifecycle.attempts(),
            session: self.session.as_ref().map(Session::id),
        });
    }

    /// Drop timers and the session; nothing fires after this
    fn release(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = self.keepalive_timer.take() {
            timer.cancel();
        }
        if self.session.take().is_some() {
            self.ctx.metrics().connection_lost();
        }
        debug!(connection = %self.id, state = %self.lifecycle.state(), "Connection released");
    }
}
