//! BrokerBlueprint - Config Loader 输出
//!
//! 描述完整的运行配置：broker 连接、投递参数、订阅列表。

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// Broker 连接设置
    pub broker: BrokerConfig,

    /// Listener 投递设置
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// 订阅列表
    pub subscriptions: Vec<SubscriptionConfig>,
}

/// Broker 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// 连接 URL (e.g., "memory://local")，不能为空
    pub url: String,

    /// 每个队列的缓冲容量
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,
}

fn default_prefetch() -> usize {
    256
}

/// Listener 投递配置
///
/// Each registered listener gets one worker with a queue of
/// `queue_capacity` pending events; every `on_event` call is bounded by
/// `delivery_timeout_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// 每个 listener 的队列容量，必须 > 0
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 单次投递超时 (毫秒)，必须 > 0
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    64
}

fn default_delivery_timeout_ms() -> u64 {
    30_000
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
        }
    }
}

impl DeliveryConfig {
    /// Delivery timeout as a `Duration`
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

/// 订阅配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// 队列名称，不能为空
    pub topic: String,

    /// Consumer 标识，不能为空
    pub consumer_tag: String,
}
