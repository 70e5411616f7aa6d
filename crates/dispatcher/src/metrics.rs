//! Listener metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single listener worker
#[derive(Debug, Default)]
pub struct ListenerMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Deliveries enqueued but not yet finished (queued + in flight)
    pending: AtomicUsize,
    /// Total successful deliveries
    delivered_count: AtomicU64,
    /// Total deliveries where the listener returned an error
    failure_count: AtomicU64,
    /// Total deliveries that exceeded the delivery timeout
    timeout_count: AtomicU64,
    /// Total deliveries where the listener panicked
    panic_count: AtomicU64,
    /// Total deliveries dropped due to full queue
    dropped_count: AtomicU64,
}

impl ListenerMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current queue length
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Set current queue length
    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Get number of unfinished deliveries
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn inc_pending(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dec_pending(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Get total delivered count
    pub fn delivered_count(&self) -> u64 {
        self.delivered_count.load(Ordering::Relaxed)
    }

    /// Increment delivered count
    pub fn inc_delivered_count(&self) {
        self.delivered_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get failure count
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Increment failure count
    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get timeout count
    pub fn timeout_count(&self) -> u64 {
        self.timeout_count.load(Ordering::Relaxed)
    }

    /// Increment timeout count
    pub fn inc_timeout_count(&self) {
        self.timeout_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get panic count
    pub fn panic_count(&self) -> u64 {
        self.panic_count.load(Ordering::Relaxed)
    }

    /// Increment panic count
    pub fn inc_panic_count(&self) {
        self.panic_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get dropped count
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Increment dropped count
    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            pending: self.pending(),
            delivered_count: self.delivered_count(),
            failure_count: self.failure_count(),
            timeout_count: self.timeout_count(),
            panic_count: self.panic_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Snapshot of listener metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub pending: usize,
    pub delivered_count: u64,
    pub failure_count: u64,
    pub timeout_count: u64,
    pub panic_count: u64,
    pub dropped_count: u64,
}

impl MetricsSnapshot {
    /// Deliveries that reached the listener but did not succeed
    pub fn unsuccessful(&self) -> u64 {
        self.failure_count + self.timeout_count + self.panic_count
    }
}
