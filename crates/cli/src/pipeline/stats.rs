//! Relay statistics and metrics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::MetricsSummary;

/// Statistics from a relay run
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    /// Input records published to the broker
    pub published: u64,

    /// Input records skipped (topic not subscribed)
    pub skipped: u64,

    /// Payloads consumed by all subscriptions
    pub consumed: u64,

    /// Whether every listener drained before the deadline
    pub drained: bool,

    /// Number of subscriptions started
    pub subscriptions: usize,

    /// Number of registered listeners
    pub listeners: usize,

    /// Total duration of the run
    pub duration: Duration,

    /// Consumer-side counters
    pub ingestion: ingestion::MetricsSnapshot,

    /// Per-listener delivery counters
    pub listener_metrics: Vec<(String, MetricsSnapshot)>,

    /// Dispatch metrics aggregated over the run
    pub summary: MetricsSummary,
}

impl RelayStats {
    /// Messages consumed per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.consumed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Relay Statistics ===\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Published: {}", self.published);
        println!("   ├─ Skipped: {}", self.skipped);
        println!("   ├─ Consumed: {}", self.consumed);
        println!("   ├─ Throughput: {:.2} msg/s", self.throughput());
        println!("   ├─ Subscriptions: {}", self.subscriptions);
        println!("   ├─ Listeners: {}", self.listeners);
        println!("   └─ Drained: {}", if self.drained { "yes" } else { "no" });

        println!("\nIngestion");
        println!("   ├─ Bytes received: {}", self.ingestion.bytes_received);
        println!("   ├─ Decode failures: {}", self.ingestion.decode_failures);
        println!("   ├─ Unrouted: {}", self.ingestion.unrouted);
        println!("   └─ Undelivered: {}", self.ingestion.undelivered);

        if !self.listener_metrics.is_empty() {
            println!("\nListeners");
            for (name, m) in &self.listener_metrics {
                println!(
                    "   ├─ {}: delivered={} failed={} timed_out={} panicked={} dropped={}",
                    name,
                    m.delivered_count,
                    m.failure_count,
                    m.timeout_count,
                    m.panic_count,
                    m.dropped_count
                );
            }
        }

        println!("\n{}", self.summary);
    }
}
