//! Ingestion metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Ingestion metrics shared by every subscription of a consumer
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Total messages received
    pub messages_received: AtomicU64,

    /// Total payload bytes received
    pub bytes_received: AtomicU64,

    /// Messages that failed to decode
    pub decode_failures: AtomicU64,

    /// Messages that decoded but had no listener
    pub unrouted: AtomicU64,

    /// Listener deliveries dropped at enqueue time
    pub undelivered: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record message received
    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record decode failure
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message nobody listened to
    pub fn record_unrouted(&self) {
        self.unrouted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record dropped deliveries
    pub fn record_undelivered(&self, count: usize) {
        self.undelivered.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            undelivered: self.undelivered.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total messages received
    pub messages_received: u64,

    /// Total payload bytes received
    pub bytes_received: u64,

    /// Messages that failed to decode
    pub decode_failures: u64,

    /// Messages that decoded but had no listener
    pub unrouted: u64,

    /// Listener deliveries dropped at enqueue time
    pub undelivered: u64,
}
