//! Ingestion 错误类型

use contracts::ContractError;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 配置错误（空 URL / topic / consumer tag）
    #[error(transparent)]
    Config(#[from] ContractError),

    /// 队列未声明
    #[error("queue '{topic}' is not declared")]
    UnknownQueue {
        /// 队列名
        topic: String,
    },

    /// 消息源已关闭
    #[error("message source closed")]
    SourceClosed,

    /// 同一 consumer tag 已在该队列上订阅
    #[error("consumer '{consumer_tag}' already subscribed to '{topic}'")]
    DuplicateConsumer {
        /// 队列名
        topic: String,
        /// 消费者标识
        consumer_tag: String,
    },
}

impl IngestionError {
    /// 空标识符错误
    pub fn empty(field: &str) -> Self {
        Self::Config(ContractError::empty_identifier(field))
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
