//! Dispatcher - decode once, fan out to every listener of a topic

use std::any::type_name;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use contracts::{DeadLetter, DeadLetterCallback, DeliveryConfig, Listener, RawMessage, Topic};

use crate::decode::{decode, Shape};
use crate::handle::{DeliveryStatus, ListenerHandle, SharedEvent};
use crate::metrics::MetricsSnapshot;
use crate::registry::ListenerRegistry;

/// Result of one dispatch call
///
/// Never an error: decode failures are reported as dead letters and the
/// ingestion loop carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Payload did not decode; no listener was invoked
    DecodeFailed,
    /// Payload decoded but the topic has no listeners
    NoListeners,
    /// Payload decoded and handed to the listener queues
    Dispatched {
        /// Listeners that accepted the event
        enqueued: usize,
        /// Listeners whose queue was full or closed
        dropped: usize,
    },
}

impl DispatchOutcome {
    /// Whether the payload decoded successfully
    pub fn is_decoded(&self) -> bool {
        !matches!(self, Self::DecodeFailed)
    }

    /// Number of listeners that accepted the event
    pub fn enqueued(&self) -> usize {
        match self {
            Self::Dispatched { enqueued, .. } => *enqueued,
            _ => 0,
        }
    }
}

/// Builder for creating a Dispatcher
#[derive(Default)]
pub struct DispatcherBuilder {
    config: DeliveryConfig,
    dead_letters: Option<DeadLetterCallback>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-listener queue capacity and delivery timeout
    pub fn delivery(mut self, config: DeliveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Dead letter callback (defaults to logging only)
    pub fn on_dead_letter(mut self, callback: DeadLetterCallback) -> Self {
        self.dead_letters = Some(callback);
        self
    }

    /// Build the dispatcher and its registry
    pub fn build(self) -> Dispatcher {
        let mut registry = ListenerRegistry::with_config(self.config);
        if let Some(callback) = self.dead_letters {
            registry = registry.on_dead_letter(callback);
        }
        Dispatcher::new(Arc::new(registry))
    }
}

/// The Dispatcher that decodes payloads and fans them out to listeners
///
/// Stateless apart from the shared registry; cheap to clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ListenerRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over an existing registry
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self { registry }
    }

    /// Start building a dispatcher with its own registry
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// The registry this dispatcher reads from
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Register a listener on the underlying registry
    pub fn register<E, L>(&self, topic: Topic, listener: L) -> Arc<ListenerHandle>
    where
        E: Send + Sync + 'static,
        L: Listener<E> + Sync + 'static,
    {
        self.registry.register(topic, listener)
    }

    /// Get metrics for all listeners of `topic`
    pub fn metrics(&self, topic: &str) -> Vec<(String, MetricsSnapshot)> {
        self.registry
            .listeners_for(topic)
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Decode `payload` as `T` and deliver it to every listener of `topic`
    ///
    /// Returns as soon as the event is queued; never waits for listeners.
    #[instrument(
        name = "dispatcher_dispatch",
        skip(self, topic, payload),
        fields(topic = %topic, bytes = payload.len())
    )]
    pub fn dispatch<T>(&self, topic: &Topic, payload: &[u8]) -> DispatchOutcome
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let event: T = match decode(payload) {
            Ok(event) => event,
            Err(e) => {
                observability::record_decode(topic, false);
                warn!(topic = %topic, error = %e, "Error decoding message, dropped");
                self.registry.reporter().report(DeadLetter::decode(
                    topic.clone(),
                    Bytes::copy_from_slice(payload),
                    e.to_string(),
                ));
                return DispatchOutcome::DecodeFailed;
            }
        };
        observability::record_decode(topic, true);

        self.fan_out(topic, Arc::new(event))
    }

    /// [`dispatch`](Self::dispatch) with an explicit shape descriptor
    pub fn dispatch_with<T>(&self, topic: &Topic, payload: &[u8], _shape: Shape<T>) -> DispatchOutcome
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.dispatch::<T>(topic, payload)
    }

    /// Dispatch a raw broker message
    pub fn dispatch_message<T>(&self, message: &RawMessage) -> DispatchOutcome
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.dispatch::<T>(&message.topic, &message.payload)
    }

    /// Deliver an already decoded event to every listener of `topic`
    ///
    /// Listeners are offered the event in registration order; each one gets
    /// the same read-only instance. A listener of another event type is
    /// skipped with a shape-mismatch dead letter and counted as dropped.
    pub fn fan_out<T>(&self, topic: &Topic, event: Arc<T>) -> DispatchOutcome
    where
        T: Send + Sync + 'static,
    {
        let listeners = self.registry.listeners_for(topic);
        observability::record_fanout(topic, listeners.len());

        if listeners.is_empty() {
            debug!(topic = %topic, "No listeners registered");
            return DispatchOutcome::NoListeners;
        }

        let event: SharedEvent = event;
        let mut enqueued = 0;
        let mut dropped = 0;
        for listener in &listeners {
            if !listener.accepts::<T>() {
                listener.reject_shape(type_name::<T>());
                dropped += 1;
                continue;
            }
            match listener.try_deliver(Arc::clone(&event)) {
                DeliveryStatus::Enqueued => enqueued += 1,
                DeliveryStatus::QueueFull | DeliveryStatus::Closed => dropped += 1,
            }
        }

        debug!(topic = %topic, enqueued, dropped, "Event dispatched");
        DispatchOutcome::Dispatched { enqueued, dropped }
    }
}

/// Convenience function to create a dispatcher from delivery settings
pub fn create_dispatcher(config: DeliveryConfig) -> Dispatcher {
    DispatcherBuilder::new().delivery(config).build()
}
