//! Relay orchestrator - wires broker, consumer, dispatcher and listeners.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{BrokerBlueprint, ContractError, DeadLetter, Listener, Topic};
use dispatcher::{Dispatcher, LogListener};
use ingestion::{Consumer, InMemoryBroker};
use observability::DispatchMetricsAggregator;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use super::{InputRecord, RelayStats};
use crate::error::CliError;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// The loaded configuration
    pub blueprint: BrokerBlueprint,

    /// Messages to publish
    pub input: Vec<InputRecord>,

    /// How long to wait for listeners to drain
    pub drain: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Logs each event and tallies delivery latency
struct TallyListener {
    name: String,
    inner: LogListener,
    stats: Arc<Mutex<DispatchMetricsAggregator>>,
}

impl Listener<Value> for TallyListener {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(&self, event: &Value) -> Result<(), ContractError> {
        let start = Instant::now();
        let result = self.inner.on_event(event).await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.stats.lock().on_delivery(result.is_ok(), latency_ms);
        result
    }
}

/// Main relay orchestrator
pub struct Relay {
    config: RelayConfig,
}

impl Relay {
    /// Create a new relay with the given configuration
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Run the relay until the input is consumed and listeners drained
    pub async fn run(self) -> Result<RelayStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let aggregator = Arc::new(Mutex::new(DispatchMetricsAggregator::new()));

        // Dispatcher
        let dead_letters = Arc::clone(&aggregator);
        let dispatcher = Dispatcher::builder()
            .delivery(blueprint.delivery)
            .on_dead_letter(Arc::new(move |letter: DeadLetter| {
                warn!(
                    topic = %letter.topic,
                    listener = ?letter.listener,
                    reason = %letter.reason,
                    "Dead letter"
                );
                dead_letters.lock().on_dead_letter(&letter);
            }))
            .build();

        // Broker + listeners, one logging listener per topic
        let broker = Arc::new(InMemoryBroker::new(blueprint.broker.prefetch));
        let topics: BTreeSet<&str> = blueprint
            .subscriptions
            .iter()
            .map(|s| s.topic.as_str())
            .collect();
        for name in &topics {
            let topic = Topic::new(name)?;
            broker.declare_queue(&topic)?;
            dispatcher.register(
                topic.clone(),
                TallyListener {
                    name: format!("log:{topic}"),
                    inner: LogListener::new(format!("log:{topic}")),
                    stats: Arc::clone(&aggregator),
                },
            );
        }
        info!(
            topics = topics.len(),
            listeners = dispatcher.registry().len(),
            "Listeners registered"
        );

        // Consumer
        let consumer = Consumer::connect(&blueprint.broker.url, Arc::clone(&broker))
            .with_context(|| format!("Failed to connect to {}", blueprint.broker.url))?;
        for sub in &blueprint.subscriptions {
            consumer
                .start_listening::<Value>(&sub.topic, &sub.consumer_tag, &dispatcher)
                .with_context(|| {
                    format!(
                        "Failed to subscribe '{}' to '{}'",
                        sub.consumer_tag, sub.topic
                    )
                })?;
        }
        info!(subscriptions = consumer.subscription_count(), "Consumer started");

        // Replay input
        let mut stats = RelayStats {
            subscriptions: blueprint.subscriptions.len(),
            listeners: dispatcher.registry().len(),
            ..Default::default()
        };
        for record in &self.config.input {
            if !topics.contains(&*record.topic) {
                let err = CliError::unknown_topic(record.line, record.topic.to_string());
                warn!(error = %err, "Skipping input record");
                stats.skipped += 1;
                continue;
            }
            broker
                .publish(&record.topic, record.payload.clone())
                .await
                .with_context(|| format!("Failed to publish input line {}", record.line))?;
            aggregator.lock().on_message();
            stats.published += 1;
        }
        info!(published = stats.published, skipped = stats.skipped, "Input published");

        // Drain
        broker.close();
        stats.consumed = consumer.join().await;
        stats.drained = dispatcher.registry().wait_idle(self.config.drain).await;
        if !stats.drained {
            warn!(
                drain_ms = self.config.drain.as_millis() as u64,
                "Listeners did not drain in time"
            );
        }

        stats.ingestion = consumer.metrics().snapshot();
        for name in &topics {
            stats.listener_metrics.extend(dispatcher.metrics(name));
        }

        dispatcher.registry().shutdown().await;

        stats.summary = aggregator.lock().summary();
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            consumed = stats.consumed,
            "Relay shutdown complete"
        );

        Ok(stats)
    }
}
