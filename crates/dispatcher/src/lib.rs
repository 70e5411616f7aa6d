//! # Dispatcher
//!
//! 事件分发模块。
//!
//! 负责：
//! - 维护 topic -> listener 注册表（读写锁，快照读取）
//! - 按类型参数解码 JSON payload
//! - Fan-out 到该 topic 的所有 listener
//! - 隔离慢 / 失败 / panic 的 listener，不阻塞 ingestion 主链路

pub mod dead_letter;
pub mod decode;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod listeners;
pub mod metrics;
pub mod registry;

pub use contracts::{DeadLetter, DeadLetterCallback, DeliveryConfig, Listener, Topic};
pub use dead_letter::DeadLetterReporter;
pub use decode::{decode, Shape};
pub use dispatcher::{create_dispatcher, DispatchOutcome, Dispatcher, DispatcherBuilder};
pub use error::DispatcherError;
pub use handle::{DeliveryStatus, ListenerHandle};
pub use listeners::{ChannelListener, LogListener};
pub use metrics::{ListenerMetrics, MetricsSnapshot};
pub use registry::ListenerRegistry;
