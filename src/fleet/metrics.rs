// ABOUTME: Metrics and observability for the connection fleet
//
// Tracks:
// - Connections: created, open right now, dormant
// - Attempts: open requests, construction failures, reconnects scheduled
// - Keepalives: sent, failed sends

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fleet-wide counters, shared by every connection through the context
#[derive(Debug, Default)]
pub struct FleetMetrics {
    pub connections_created: AtomicU64,
    pub connections_open: AtomicU64,
    pub connections_dormant: AtomicU64,
    pub open_attempts: AtomicU64,
    pub construction_failures: AtomicU64,
    pub reconnects_scheduled: AtomicU64,
    pub keepalives_sent: AtomicU64,
    pub send_failures: AtomicU64,
}

impl FleetMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.connections_open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_lost(&self) {
        self.connections_open.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_dormant(&self) {
        self.connections_dormant.fetch_add(1, Ordering::Relaxed);
    }

    pub fn open_attempted(&self) {
        self.open_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn construction_failed(&self) {
        self.construction_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn keepalive_sent(&self) {
        self.keepalives_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_failed(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_open: self.connections_open.load(Ordering::Relaxed),
            connections_dormant: self.connections_dormant.load(Ordering::Relaxed),
            open_attempts: self.open_attempts.load(Ordering::Relaxed),
            construction_failures: self.construction_failures.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of `FleetMetrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connections_created: u64,
    pub connections_open: u64,
    pub connections_dormant: u64,
    pub open_attempts: u64,
    pub construction_failures: u64,
    pub reconnects_scheduled: u64,
    pub keepalives_sent: u64,
    pub send_failures: u64,
}
