//! Consumer - bridges a message source to the dispatcher
//!
//! One long-running task per subscription. Each task pulls payloads from
//! its stream and calls `dispatch` exactly once per payload.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use contracts::Topic;
use dispatcher::{DispatchOutcome, Dispatcher};

use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};
use crate::source::MessageSource;

/// Handle to a running subscription
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    topic: Topic,
    consumer_tag: String,
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    /// Topic this subscription consumes
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Consumer identifier
    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Stop this subscription
    ///
    /// The consumer tag is released once the task has exited.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether `stop` (or consumer shutdown) was requested
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Consumer over a message source
pub struct Consumer<S> {
    url: String,
    source: Arc<S>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<IngestionMetrics>,
}

impl<S: MessageSource> Consumer<S> {
    /// Attach to `source`, identified by its connection URL
    pub fn connect(url: impl Into<String>, source: Arc<S>) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(IngestionError::empty("connectionUrl"));
        }
        info!(url = %url, "Consumer connected");
        Ok(Self {
            url,
            source,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            metrics: Arc::new(IngestionMetrics::new()),
        })
    }

    /// Connection URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Metrics shared by every subscription
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Number of subscriptions still running
    pub fn subscription_count(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.len()
    }

    /// Start consuming `topic`, decoding each payload as `T`
    ///
    /// Returns once the subscription is running. Must be called from within
    /// a Tokio runtime.
    #[instrument(name = "consumer_start_listening", skip(self, dispatcher))]
    pub fn start_listening<T>(
        &self,
        topic: &str,
        consumer_tag: &str,
        dispatcher: &Dispatcher,
    ) -> Result<SubscriptionHandle>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        if topic.is_empty() {
            return Err(IngestionError::empty("queueName"));
        }
        if consumer_tag.is_empty() {
            return Err(IngestionError::empty("eventName"));
        }
        let topic = Topic::new(topic)?;
        let stream = self.source.subscribe(&topic, consumer_tag)?;

        let handle = SubscriptionHandle {
            topic: topic.clone(),
            consumer_tag: consumer_tag.to_string(),
            cancel: self.cancel.child_token(),
        };
        let task = Subscription {
            topic,
            consumer_tag: consumer_tag.to_string(),
            source: Arc::clone(&self.source),
            dispatcher: dispatcher.clone(),
            metrics: Arc::clone(&self.metrics),
        };
        let join = tokio::spawn(task.run::<T>(stream, handle.cancel.clone()));

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(join);

        info!("Waiting for messages");
        Ok(handle)
    }

    /// Cancel every subscription and wait for their tasks
    ///
    /// Returns the total number of payloads consumed.
    #[instrument(name = "consumer_shutdown", skip(self))]
    pub async fn shutdown(&self) -> u64 {
        self.cancel.cancel();
        let consumed = self.join().await;
        info!(consumed, "Consumer shut down");
        consumed
    }

    /// Wait for every subscription to end on its own (source closed)
    ///
    /// Returns the total number of payloads consumed.
    pub async fn join(&self) -> u64 {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Subscription task failed");
            }
        }
        self.metrics.snapshot().messages_received
    }
}

impl<S> std::fmt::Debug for Consumer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("url", &self.url)
            .field("subscriptions", &self.tasks.lock().len())
            .finish()
    }
}

struct Subscription<S> {
    topic: Topic,
    consumer_tag: String,
    source: Arc<S>,
    dispatcher: Dispatcher,
    metrics: Arc<IngestionMetrics>,
}

impl<S: MessageSource> Subscription<S> {
    async fn run<T>(self, stream: async_channel::Receiver<Bytes>, cancel: CancellationToken)
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let mut consumed = 0u64;
        loop {
            let payload = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = stream.recv() => match next {
                    Ok(payload) => payload,
                    Err(_) => {
                        info!(topic = %self.topic, consumer_tag = %self.consumer_tag, "Source closed");
                        break;
                    }
                },
            };
            consumed += 1;
            self.handle::<T>(&payload);
        }
        self.source.unsubscribe(&self.topic, &self.consumer_tag);
        debug!(topic = %self.topic, consumed, "Subscription ended");
    }

    fn handle<T>(&self, payload: &Bytes)
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.metrics.record_received(payload.len());
        observability::record_message_received(&self.topic, payload.len());
        debug!(
            topic = %self.topic,
            consumer_tag = %self.consumer_tag,
            bytes = payload.len(),
            "Received a message"
        );

        match self.dispatcher.dispatch::<T>(&self.topic, payload) {
            DispatchOutcome::DecodeFailed => self.metrics.record_decode_failure(),
            DispatchOutcome::NoListeners => self.metrics.record_unrouted(),
            DispatchOutcome::Dispatched { dropped, .. } if dropped > 0 => {
                self.metrics.record_undelivered(dropped)
            }
            DispatchOutcome::Dispatched { .. } => {}
        }
    }
}
