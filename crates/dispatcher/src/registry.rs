//! ListenerRegistry - topic to listener mapping
//!
//! Reads and writes go through a reader-writer lock: lookups proceed in
//! parallel, a registration excludes everything else while it appends.
//! Lookups return a cloned snapshot, so no caller ever observes a
//! half-appended sequence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use contracts::{DeadLetterCallback, DeliveryConfig, Listener, Topic};

use crate::dead_letter::DeadLetterReporter;
use crate::handle::ListenerHandle;

/// Registry of listeners per topic
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<Topic, Vec<Arc<ListenerHandle>>>>,
    config: DeliveryConfig,
    reporter: DeadLetterReporter,
    cancel: CancellationToken,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    /// Create a registry with default delivery settings
    pub fn new() -> Self {
        Self::with_config(DeliveryConfig::default())
    }

    /// Create a registry with custom delivery settings
    pub fn with_config(config: DeliveryConfig) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            config,
            reporter: DeadLetterReporter::logging(),
            cancel: CancellationToken::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Send dead letters to `callback` instead of only logging them
    ///
    /// Applies to listeners registered after this call.
    pub fn on_dead_letter(mut self, callback: DeadLetterCallback) -> Self {
        self.reporter = DeadLetterReporter::new(callback);
        self
    }

    /// Delivery settings used for new listeners
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub(crate) fn reporter(&self) -> &DeadLetterReporter {
        &self.reporter
    }

    /// Register `listener` for `topic`
    ///
    /// Appends to the topic's sequence (creating it if absent) and creates the
    /// listener's delivery worker. Never fails; duplicates are kept. Outside a
    /// Tokio runtime the worker starts on first delivery or [`start`](Self::start).
    ///
    /// The first listener fixes the topic's event type. A listener of another
    /// type is still registered, with a warning; its deliveries become
    /// shape-mismatch dead letters.
    #[instrument(
        name = "registry_register",
        skip(self, topic, listener),
        fields(topic = %topic, listener = %listener.name())
    )]
    pub fn register<E, L>(&self, topic: Topic, listener: L) -> Arc<ListenerHandle>
    where
        E: Send + Sync + 'static,
        L: Listener<E> + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(ListenerHandle::spawn::<E, L>(
            id,
            topic.clone(),
            listener,
            &self.config,
            self.reporter.clone(),
            self.cancel.child_token(),
        ));

        let (count, shape) = {
            let mut listeners = self.listeners.write();
            let entry = listeners.entry(topic).or_default();
            let shape = entry
                .first()
                .filter(|first| first.event_type_id() != handle.event_type_id())
                .map(|first| first.event_type());
            entry.push(Arc::clone(&handle));
            (entry.len(), shape)
        };
        if let Some(expected) = shape {
            warn!(
                expected,
                actual = handle.event_type(),
                "Listener event type differs from the topic's"
            );
        }

        debug!(id, listeners = count, "Listener registered");
        handle
    }

    /// Current listeners for `topic`, in registration order
    ///
    /// Returns an empty sequence for unknown topics.
    pub fn listeners_for(&self, topic: &str) -> Vec<Arc<ListenerHandle>> {
        self.listeners
            .read()
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Event type name the topic's first listener consumes
    pub fn shape_of(&self, topic: &str) -> Option<&'static str> {
        self.listeners
            .read()
            .get(topic)
            .and_then(|handles| handles.first())
            .map(|first| first.event_type())
    }

    /// Number of listeners registered for `topic`
    pub fn listener_count(&self, topic: &str) -> usize {
        self.listeners.read().get(topic).map_or(0, Vec::len)
    }

    /// Topics with at least one listener
    pub fn topics(&self) -> Vec<Topic> {
        self.listeners.read().keys().cloned().collect()
    }

    /// Total number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }

    /// No listener registered on any topic
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn all_handles(&self) -> Vec<Arc<ListenerHandle>> {
        self.listeners.read().values().flatten().cloned().collect()
    }

    /// Spawn workers of listeners registered outside a runtime
    ///
    /// Returns how many workers are running afterwards.
    pub fn start(&self) -> usize {
        self.all_handles().iter().filter(|h| h.start()).count()
    }

    /// Wait until every listener has drained its queue
    ///
    /// Returns false if `timeout` elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.start();
        let handles = self.all_handles();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if handles.iter().all(|h| h.is_idle()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Stop every listener worker
    #[instrument(name = "registry_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles = self.all_handles();
        for handle in &handles {
            handle.shutdown().await;
        }
        info!(listeners = handles.len(), "Listener registry shut down");
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("config", &self.config)
            .field("listeners", &self.len())
            .finish()
    }
}
