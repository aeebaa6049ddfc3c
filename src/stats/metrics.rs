//! Statistics for the broadcast core

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free counters shared by the session manager and the dispatcher
#[derive(Debug)]
pub struct LiveStats {
    started_at: Instant,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    auth_failures: AtomicU64,
    stale_reaped: AtomicU64,
    publishes: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
}

impl LiveStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            stale_reaped: AtomicU64::new(0),
            publishes: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn auth_failed(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reaped(&self, count: u64) {
        self.stale_reaped.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn published(&self, delivered: u64, failed: u64) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered, Ordering::Relaxed);
        self.delivery_failures.fetch_add(failed, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        let opened = self.connections_opened.load(Ordering::Relaxed);
        let closed = self.connections_closed.load(Ordering::Relaxed);
        StatsSnapshot {
            total_connections: opened,
            open_connections: opened.saturating_sub(closed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            stale_reaped: self.stale_reaped.load(Ordering::Relaxed),
            publishes: self.publishes.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for LiveStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    /// Total connections ever opened
    pub total_connections: u64,
    /// Connections opened and not yet torn down
    pub open_connections: u64,
    /// Connections rejected by the authenticator
    pub auth_failures: u64,
    /// Connections torn down by the heartbeat reaper
    pub stale_reaped: u64,
    /// Publish calls
    pub publishes: u64,
    /// Successful per-connection deliveries
    pub deliveries: u64,
    /// Failed per-connection deliveries
    pub delivery_failures: u64,
    /// Uptime
    pub uptime: Duration,
}
