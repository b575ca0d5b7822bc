//! Agent metrics collection.
//!
//! Aggregate counters only; nothing about individual destinations is kept.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Agent metrics collector.
pub struct AgentMetrics {
    /// Agent start time
    start_time: Instant,
    /// Total connections accepted
    total_connections: AtomicU64,
    /// Current active connections
    active_connections: AtomicU64,
    /// Sessions that ended with an error
    failed_sessions: AtomicU64,
    /// Failed accept() calls
    accept_errors: AtomicU64,
}

impl AgentMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            failed_sessions: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
        }
    }

    /// Increment total and active connections.
    pub fn increment_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connections.
    pub fn decrement_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Increment failed session count.
    pub fn increment_failed(&self) {
        self.failed_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment accept error count.
    pub fn increment_accept_errors(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get total connections.
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Get active connections.
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get failed sessions.
    pub fn failed_sessions(&self) -> u64 {
        self.failed_sessions.load(Ordering::Relaxed)
    }

    /// Get accept errors.
    pub fn accept_errors(&self) -> u64 {
        self.accept_errors.load(Ordering::Relaxed)
    }

    /// One-line summary for the shutdown log.
    pub fn summary(&self) -> String {
        format!(
            "uptime {}s, {} connections ({} active, {} failed), {} accept errors",
            self.uptime_secs(),
            self.total_connections(),
            self.active_connections(),
            self.failed_sessions(),
            self.accept_errors(),
        )
    }
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}
