//! Dispatch 指标收集模块
//!
//! 记录 ingestion、decode、listener 投递的运行指标。

use contracts::DeadLetter;
use metrics::{counter, gauge, histogram};

/// 记录 broker 消息接收
pub fn record_message_received(topic: &str, bytes: usize) {
    counter!("event_relay_messages_received_total", "topic" => topic.to_string()).increment(1);
    histogram!("event_relay_message_bytes", "topic" => topic.to_string()).record(bytes as f64);
}

/// 记录 decode 结果
pub fn record_decode(topic: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "event_relay_decode_total",
        "topic" => topic.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录一次 fan-out 的 listener 数量
pub fn record_fanout(topic: &str, listeners: usize) {
    histogram!("event_relay_fanout_listeners", "topic" => topic.to_string())
        .record(listeners as f64);
}

/// 记录单次 listener 投递
pub fn record_delivery(listener: &str, success: bool, latency_ms: f64) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "event_relay_deliveries_total",
        "listener" => listener.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("event_relay_delivery_latency_ms", "listener" => listener.to_string())
        .record(latency_ms);
}

/// 记录 listener 队列深度
pub fn record_queue_depth(listener: &str, depth: usize) {
    gauge!("event_relay_listener_queue_depth", "listener" => listener.to_string())
        .set(depth as f64);
}

/// 记录 dead letter
pub fn record_dead_letter(letter: &DeadLetter) {
    counter!(
        "event_relay_dead_letters_total",
        "topic" => letter.topic.to_string(),
        "reason" => letter.reason.label().to_string()
    )
    .increment(1);
}

/// Dispatch 指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DispatchMetricsAggregator {
    /// 收到的消息数
    pub messages_received: u64,

    /// decode 失败数
    pub decode_failures: u64,

    /// 成功投递数
    pub deliveries_succeeded: u64,

    /// 失败投递数 (错误/超时/panic)
    pub deliveries_failed: u64,

    /// 各原因的 dead letter 计数
    pub dead_letters: std::collections::HashMap<&'static str, u64>,

    /// 投递延迟统计 (毫秒)
    pub delivery_latency_ms: RunningStats,
}

impl DispatchMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条收到的消息
    pub fn on_message(&mut self) {
        self.messages_received += 1;
    }

    /// 记录一次投递
    pub fn on_delivery(&mut self, success: bool, latency_ms: f64) {
        if success {
            self.deliveries_succeeded += 1;
        } else {
            self.deliveries_failed += 1;
        }
        self.delivery_latency_ms.push(latency_ms);
    }

    /// 记录一条 dead letter
    pub fn on_dead_letter(&mut self, letter: &DeadLetter) {
        let label = letter.reason.label();
        if label == "decode" {
            self.decode_failures += 1;
        }
        *self.dead_letters.entry(label).or_insert(0) += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            messages_received: self.messages_received,
            decode_failures: self.decode_failures,
            deliveries_succeeded: self.deliveries_succeeded,
            deliveries_failed: self.deliveries_failed,
            decode_failure_rate: if self.messages_received > 0 {
                self.decode_failures as f64 / self.messages_received as f64 * 100.0
            } else {
                0.0
            },
            delivery_latency_ms: StatsSummary::from(&self.delivery_latency_ms),
            dead_letters: self.dead_letters.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub messages_received: u64,
    pub decode_failures: u64,
    pub deliveries_succeeded: u64,
    pub deliveries_failed: u64,
    pub decode_failure_rate: f64,
    pub delivery_latency_ms: StatsSummary,
    pub dead_letters: std::collections::HashMap<&'static str, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Dispatch Metrics Summary ===")?;
        writeln!(f, "Messages received: {}", self.messages_received)?;
        writeln!(
            f,
            "Decode failures: {} ({:.2}%)",
            self.decode_failures, self.decode_failure_rate
        )?;
        writeln!(f, "Deliveries succeeded: {}", self.deliveries_succeeded)?;
        writeln!(f, "Deliveries failed: {}", self.deliveries_failed)?;
        writeln!(f, "Delivery latency (ms): {}", self.delivery_latency_ms)?;

        if !self.dead_letters.is_empty() {
            writeln!(f, "Dead letters:")?;
            let mut reasons: Vec<_> = self.dead_letters.iter().collect();
            reasons.sort();
            for (reason, count) in reasons {
                writeln!(f, "  {}: {}", reason, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{DeadLetterReason, Topic};

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_counts_dead_letters() {
        let mut aggregator = DispatchMetricsAggregator::new();
        let topic = Topic::new("orders").unwrap();

        aggregator.on_message();
        aggregator.on_message();
        aggregator.on_dead_letter(&DeadLetter::decode(
            topic.clone(),
            Bytes::from_static(b"nope"),
            "expected value",
        ));
        aggregator.on_delivery(true, 1.5);
        aggregator.on_dead_letter(&DeadLetter::delivery(
            topic,
            "audit",
            DeadLetterReason::QueueFull,
        ));

        let summary = aggregator.summary();
        assert_eq!(summary.messages_received, 2);
        assert_eq!(summary.decode_failures, 1);
        assert_eq!(summary.deliveries_succeeded, 1);
        assert!((summary.decode_failure_rate - 50.0).abs() < 1e-10);
        assert_eq!(summary.dead_letters.get("queue_full"), Some(&1));
    }

    #[test]
    fn test_summary_display() {
        let summary = MetricsSummary {
            messages_received: 100,
            decode_failures: 5,
            decode_failure_rate: 5.0,
            ..Default::default()
        };

        let output = format!("{}", summary);
        assert!(output.contains("Messages received: 100"));
        assert!(output.contains("5.00%"));
        assert!(output.contains("Delivery latency (ms): N/A"));
    }
}
