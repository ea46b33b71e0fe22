// ABOUTME: Fleet of persistent WebSocket connections to a single endpoint
//
// Every connection runs its own reconnect/keepalive state machine on a
// shared FleetContext. The pool creates connections in batches and rotates
// the egress route between batches.
//
// Key components:
// - context: injected runtime, task tracker, shutdown token, timers, transport
// - timer: one-shot and periodic timers with owning cancel handles
// - state: pure lifecycle bookkeeping (state + attempt counter)
// - connection: per-connection actor driving the state machine
// - pool: batch creation and route rotation
// - route: egress routes and route providers
// - transport: the open/send seam plus the tokio-tungstenite implementation
// - metrics: fleet-wide counters

pub mod config;
pub mod connection;
pub mod context;
pub mod metrics;
pub mod pool;
pub mod route;
pub mod state;
pub mod timer;
pub mod transport;

// Re-exports for convenient access
pub use config::{ConfigError, ConnectionConfig, FleetConfig};
pub use connection::{Connection, ConnectionId, ConnectionStatus};
pub use context::FleetContext;
pub use metrics::{FleetMetrics, MetricsSnapshot};
pub use pool::ConnectionPool;
pub use route::{EgressRoute, FixedRoute, RoundRobinRoutes, RouteError, RouteProvider};
pub use state::ConnectionState;
pub use timer::{TimerError, TimerFacility, TimerHandle};
pub use transport::{
    Session, SessionEnd, SessionId, Target, Transport, TransportError, WebSocketTransport,
};
