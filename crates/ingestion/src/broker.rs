//! InMemoryBroker - in-process work-queue broker
//!
//! Each queue is a bounded MPMC channel. Publishers wait for capacity,
//! consumers on the same queue compete for payloads.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_channel::{bounded, Receiver, Sender};
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use contracts::Topic;

use crate::error::{IngestionError, Result};
use crate::source::MessageSource;

struct Queue {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
    consumers: HashSet<String>,
}

/// In-process broker with named queues
pub struct InMemoryBroker {
    queues: RwLock<HashMap<Topic, Queue>>,
    capacity: usize,
    closed: AtomicBool,
}

impl InMemoryBroker {
    /// Create a broker whose queues hold at most `capacity` payloads
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Declare a queue; declaring an existing queue is a no-op
    pub fn declare_queue(&self, topic: &Topic) -> Result<()> {
        if self.is_closed() {
            return Err(IngestionError::SourceClosed);
        }
        let mut queues = self.queues.write();
        if !queues.contains_key(topic) {
            let (tx, rx) = bounded(self.capacity);
            queues.insert(
                topic.clone(),
                Queue {
                    tx,
                    rx,
                    consumers: HashSet::new(),
                },
            );
            debug!(topic = %topic, capacity = self.capacity, "Queue declared");
        }
        Ok(())
    }

    /// Publish a payload, waiting while the queue is full
    pub async fn publish(&self, topic: &Topic, payload: impl Into<Bytes>) -> Result<()> {
        let tx = self.sender(topic)?;
        tx.send(payload.into())
            .await
            .map_err(|_| IngestionError::SourceClosed)
    }

    /// Publish without waiting; fails when the queue is full
    pub fn try_publish(&self, topic: &Topic, payload: impl Into<Bytes>) -> Result<bool> {
        let tx = self.sender(topic)?;
        match tx.try_send(payload.into()) {
            Ok(()) => Ok(true),
            Err(async_channel::TrySendError::Full(_)) => Ok(false),
            Err(async_channel::TrySendError::Closed(_)) => Err(IngestionError::SourceClosed),
        }
    }

    fn sender(&self, topic: &Topic) -> Result<Sender<Bytes>> {
        self.queues
            .read()
            .get(topic)
            .map(|q| q.tx.clone())
            .ok_or_else(|| IngestionError::UnknownQueue {
                topic: topic.to_string(),
            })
    }

    /// Payloads waiting in `topic`'s queue
    pub fn queue_len(&self, topic: &str) -> usize {
        self.queues.read().get(topic).map_or(0, |q| q.rx.len())
    }

    /// Declared queue names
    pub fn queues(&self) -> Vec<Topic> {
        self.queues.read().keys().cloned().collect()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every queue
    ///
    /// Consumers still receive payloads already queued, then their streams end.
    #[instrument(name = "broker_close", skip(self))]
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let queues = self.queues.read();
        for queue in queues.values() {
            queue.tx.close();
        }
        info!(queues = queues.len(), "Broker closed");
    }
}

impl MessageSource for InMemoryBroker {
    fn subscribe(&self, topic: &Topic, consumer_tag: &str) -> Result<Receiver<Bytes>> {
        if self.is_closed() {
            return Err(IngestionError::SourceClosed);
        }
        let mut queues = self.queues.write();
        let queue = queues
            .get_mut(topic)
            .ok_or_else(|| IngestionError::UnknownQueue {
                topic: topic.to_string(),
            })?;
        if !queue.consumers.insert(consumer_tag.to_string()) {
            return Err(IngestionError::DuplicateConsumer {
                topic: topic.to_string(),
                consumer_tag: consumer_tag.to_string(),
            });
        }
        debug!(topic = %topic, consumer_tag, "Consumer subscribed");
        Ok(queue.rx.clone())
    }

    fn unsubscribe(&self, topic: &Topic, consumer_tag: &str) {
        if let Some(queue) = self.queues.write().get_mut(topic) {
            if queue.consumers.remove(consumer_tag) {
                debug!(topic = %topic, consumer_tag, "Consumer released");
            }
        }
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("queues", &self.queues.read().len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
