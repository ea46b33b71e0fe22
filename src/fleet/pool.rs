// ABOUTME: Connection pool that creates connections in batches
// ABOUTME: Rotates the egress route between batches via a RouteProvider

//! Connection Pool
//!
//! The `ConnectionPool` owns every `Connection` it creates. Connections are
//! created in batches; all members of a batch share the route the provider
//! reports at batch time, and the provider is advanced once after each batch.
//!
//! ```text
//! run(3, 2) with routes R0, R1, R2
//!
//!   batch 0: #0 #1  -> R0   advance()
//!   batch 1: #2 #3  -> R1   advance()
//!   batch 2: #4 #5  -> R2   advance()
//! ```
//!
//! The pool never removes connections; dormant ones stay in the collection.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::config::ConnectionConfig;
use super::connection::Connection;
use super::context::FleetContext;
use super::route::RouteProvider;
use super::state::ConnectionState;
use super::transport::Target;

/// Owns all connections to a single target
pub struct ConnectionPool<P: RouteProvider> {
    ctx: FleetContext,
    target: Target,
    config: ConnectionConfig,
    routes: P,
    connections: Vec<Connection>,
}

impl<P: RouteProvider> std::fmt::Debug for ConnectionPool<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("target", &self.target.as_str())
            .field("connection_count", &self.connections.len())
            .finish_non_exhaustive()
    }
}

impl<P: RouteProvider> ConnectionPool<P> {
    /// Create an empty pool
    pub fn new(ctx: FleetContext, target: Target, config: ConnectionConfig, routes: P) -> Self {
        Self {
            ctx,
            target,
            config,
            routes,
            connections: Vec::new(),
        }
    }

    /// Create `size` connections on the current route
    ///
    /// Each connection issues its first connect before this returns.
    /// Failures stay contained in the individual connections.
    pub fn create_batch(&mut self, size: usize) {
        let route = self.routes.current();
        let first = self.connections.len();
        self.connections.reserve(size);

        for offset in 0..size {
            let connection = Connection::spawn(
                &self.ctx,
                first + offset,
                self.target.clone(),
                route.clone(),
                self.config.clone(),
            );
            self.connections.push(connection);
        }

        debug!(first, size, route = %route, "Created connection batch");
    }

    /// Create `batch_count` batches of `batch_size`, advancing the route after each
    pub fn run(&mut self, batch_count: usize, batch_size: usize) {
        info!(
            endpoint = %self.target,
            batch_count,
            batch_size,
            "Creating connection pool"
        );

        for _ in 0..batch_count {
            self.create_batch(batch_size);
            self.routes.advance();
        }

        info!(connections = self.connections.len(), "All batches created");
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub const fn target(&self) -> &Target {
        &self.target
    }

    pub const fn routes(&self) -> &P {
        &self.routes
    }

    pub const fn context(&self) -> &FleetContext {
        &self.ctx
    }

    /// Number of connections currently in each state
    pub fn state_counts(&self) -> BTreeMap<ConnectionState, usize> {
        let mut counts = BTreeMap::new();
        for connection in &self.connections {
            *counts.entry(connection.state()).or_insert(0) += 1;
        }
        counts
    }
}
