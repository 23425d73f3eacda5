//! Relay counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Default)]
struct Counters {
    registered: AtomicU64,
    rejected: AtomicU64,
    relayed: AtomicU64,
    undeliverable: AtomicU64,
    dropped: AtomicU64,
}

/// Cheap-to-clone handle to the registry's counters.
#[derive(Clone)]
pub struct RelayStats {
    counters: Arc<Counters>,
    started_at: Instant,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub registered: u64,
    pub rejected: u64,
    pub relayed: u64,
    pub undeliverable: u64,
    pub dropped: u64,
    pub uptime_secs: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            started_at: Instant::now(),
        }
    }

    pub fn record_registered(&self) {
        self.counters.registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relayed(&self) {
        self.counters.relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_undeliverable(&self) {
        self.counters.undeliverable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.counters;
        StatsSnapshot {
            registered: c.registered.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            relayed: c.relayed.load(Ordering::Relaxed),
            undeliverable: c.undeliverable.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    /// Log the counters. Quiet until something has happened.
    pub fn log_stats(&self, clients_online: usize) {
        let s = self.snapshot();
        if s.registered == 0 && s.rejected == 0 {
            return;
        }
        tracing::info!(
            clients_online,
            registered = s.registered,
            rejected = s.rejected,
            relayed = s.relayed,
            undeliverable = s.undeliverable,
            dropped = s.dropped,
            "relay stats"
        );
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}
