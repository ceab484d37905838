use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks dispatch metrics for the event hub
pub struct HubMetrics {
    /// Total events accepted by `dispatch` (lifetime counter)
    total_events: AtomicU64,

    /// Events handed to listener workers
    deliveries: AtomicU64,

    /// Paired dispatches answered by a response event
    paired_responses: AtomicU64,

    /// Paired dispatches that ran out of time
    paired_timeouts: AtomicU64,
}

/// Point-in-time copy of hub metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_events: u64,
    pub deliveries: u64,
    pub paired_responses: u64,
    pub paired_timeouts: u64,
    pub pending_responses: usize,
    pub listeners: usize,
}

impl HubMetrics {
    pub fn new() -> Self {
        Self {
            total_events: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            paired_responses: AtomicU64::new(0),
            paired_timeouts: AtomicU64::new(0),
        }
    }

    /// Record an accepted event (called from dispatch)
    pub fn record_event(&self) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self) {
        self.paired_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.paired_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_events(&self) -> u64 {
        self.total_events.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self, pending_responses: usize, listeners: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            total_events: self.total_events(),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            paired_responses: self.paired_responses.load(Ordering::Relaxed),
            paired_timeouts: self.paired_timeouts.load(Ordering::Relaxed),
            pending_responses,
            listeners,
        }
    }
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self::new()
    }
}
