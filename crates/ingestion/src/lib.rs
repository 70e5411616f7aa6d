//! # Ingestion
//!
//! Broker-facing side of the relay.
//!
//! Responsibilities:
//! - Open consumer streams on a [`MessageSource`] (one per subscription)
//! - Validate connection URL, queue name and consumer tag up front
//! - Hand every payload to the dispatcher exactly once
//! - Provide an in-process [`InMemoryBroker`] with work-queue semantics
//!
//! ## Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ingestion::{Consumer, InMemoryBroker};
//!
//! let broker = Arc::new(InMemoryBroker::new(256));
//! broker.declare_queue(&topic)?;
//!
//! let consumer = Consumer::connect("memory://local", broker.clone())?;
//! consumer.start_listening::<Order>("orders", "order-events", &dispatcher)?;
//!
//! broker.publish(&topic, payload).await?;
//! ```

mod broker;
mod config;
mod consumer;
mod error;
mod source;

// Re-exports
pub use broker::InMemoryBroker;
pub use config::{IngestionMetrics, MetricsSnapshot};
pub use consumer::{Consumer, SubscriptionHandle};
pub use error::{IngestionError, Result};
pub use source::MessageSource;
