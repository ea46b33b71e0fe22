// ABOUTME: Explicit event substrate injected into every fleet component
//
// Bundles the runtime handle, the task tracker used for orderly teardown,
// the shutdown token, the timer facility, the transport and the metrics.
// Cloning is cheap; all clones share the same substrate.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use super::metrics::FleetMetrics;
use super::timer::TimerFacility;
use super::transport::Transport;

/// Shared substrate for a fleet of connections
#[derive(Clone)]
pub struct FleetContext {
    runtime: Handle,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    timers: TimerFacility,
    transport: Arc<dyn Transport>,
    metrics: Arc<FleetMetrics>,
}

impl fmt::Debug for FleetContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FleetContext")
            .field("tasks", &self.tracker.len())
            .field("shutting_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl FleetContext {
    /// Build a context that runs everything on `runtime` over `transport`
    pub fn new(runtime: Handle, transport: Arc<dyn Transport>) -> Self {
        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();
        let timers = TimerFacility::new(runtime.clone(), tracker.clone(), shutdown.clone());

        Self {
            runtime,
            tracker,
            shutdown,
            timers,
            transport,
            metrics: Arc::new(FleetMetrics::new()),
        }
    }

    /// Build a context on the runtime we are currently inside
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn current(transport: Arc<dyn Transport>) -> Self {
        Self::new(Handle::current(), transport)
    }

    /// Spawn a tracked task on the fleet runtime
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn_on(task, &self.runtime);
    }

    pub const fn timers(&self) -> &TimerFacility {
        &self.timers
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub const fn metrics(&self) -> &Arc<FleetMetrics> {
        &self.metrics
    }

    pub const fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of live tracked tasks (actors, timers, open requests)
    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }

    /// Stop scheduling, drain every tracked task, then release the transport
    ///
    /// Pending timers are dropped without firing. Safe to call more than once.
    pub async fn shutdown(&self) {
        info!(tasks = self.tracker.len(), "Shutting down fleet");

        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("Fleet tasks drained");

        self.transport.shutdown().await;
        info!("Fleet shutdown complete");
    }
}
