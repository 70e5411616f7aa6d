//! 配置校验模块
//!
//! 校验规则：
//! - broker.url 非空
//! - broker.prefetch > 0
//! - delivery.queue_capacity > 0, delivery.delivery_timeout_ms > 0
//! - subscription 的 topic / consumer_tag 非空
//! - (topic, consumer_tag) 组合唯一

use std::collections::HashSet;

use contracts::{BrokerBlueprint, ContractError};

/// 校验 BrokerBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &BrokerBlueprint) -> Result<(), ContractError> {
    validate_broker(blueprint)?;
    validate_delivery(blueprint)?;
    validate_subscriptions(blueprint)?;
    Ok(())
}

/// 校验 broker 连接配置
fn validate_broker(blueprint: &BrokerBlueprint) -> Result<(), ContractError> {
    if blueprint.broker.url.is_empty() {
        return Err(ContractError::config_validation(
            "broker.url",
            "connection url cannot be empty",
        ));
    }
    if blueprint.broker.prefetch == 0 {
        return Err(ContractError::config_validation(
            "broker.prefetch",
            "prefetch must be > 0",
        ));
    }
    Ok(())
}

/// 校验投递参数
fn validate_delivery(blueprint: &BrokerBlueprint) -> Result<(), ContractError> {
    let delivery = &blueprint.delivery;
    if delivery.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "delivery.queue_capacity",
            "queue_capacity must be > 0",
        ));
    }
    if delivery.delivery_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "delivery.delivery_timeout_ms",
            "delivery_timeout_ms must be > 0",
        ));
    }
    Ok(())
}

/// 校验订阅列表
fn validate_subscriptions(blueprint: &BrokerBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sub) in blueprint.subscriptions.iter().enumerate() {
        if sub.topic.is_empty() {
            return Err(ContractError::config_validation(
                format!("subscriptions[{}].topic", idx),
                "topic cannot be empty",
            ));
        }
        if sub.consumer_tag.is_empty() {
            return Err(ContractError::config_validation(
                format!("subscriptions[{}].consumer_tag", idx),
                "consumer_tag cannot be empty",
            ));
        }
        if !seen.insert((sub.topic.as_str(), sub.consumer_tag.as_str())) {
            return Err(ContractError::config_validation(
                format!("subscriptions[topic={}]", sub.topic),
                format!("duplicate subscription for consumer '{}'", sub.consumer_tag),
            ));
        }
    }
    Ok(())
}
