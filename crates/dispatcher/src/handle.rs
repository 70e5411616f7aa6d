//! ListenerHandle - manages a listener with isolated queue and worker task
//!
//! Every registered listener owns one bounded queue and one worker. The
//! dispatch path only ever does a non-blocking `try_send`, so a slow or
//! stuck listener can hold at most `queue_capacity` pending events plus the
//! one it is currently handling.
//!
//! The queue exists from registration on. The worker is spawned on the
//! ambient runtime if there is one, otherwise on the first delivery or
//! [`ListenerHandle::start`] made from inside a runtime. Events queued
//! before that wait in the queue.

use std::any::{type_name, Any, TypeId};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use contracts::{DeadLetter, DeadLetterReason, DeliveryConfig, Listener, Topic};

use crate::dead_letter::DeadLetterReporter;
use crate::metrics::ListenerMetrics;

/// Decoded event shared read-only by every listener of one dispatch
pub(crate) type SharedEvent = Arc<dyn Any + Send + Sync>;

/// Outcome of handing one event to a listener queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Event queued for the worker
    Enqueued,
    /// Queue full, event dropped for this listener
    QueueFull,
    /// Worker stopped, event dropped for this listener
    Closed,
}

/// Lifecycle of a listener's worker task
enum Worker {
    /// Built outside a runtime, not yet spawned
    Pending(BoxFuture<'static, ()>),
    Running(JoinHandle<()>),
    Stopped,
}

/// Handle to a listener worker
pub struct ListenerHandle {
    /// Registration sequence number
    id: u64,
    /// Listener name
    name: String,
    /// Topic the listener is registered on
    topic: Topic,
    /// Event type the listener accepts
    event_type: &'static str,
    event_type_id: TypeId,
    /// Channel to send events to worker
    tx: mpsc::Sender<SharedEvent>,
    /// Shared metrics
    metrics: Arc<ListenerMetrics>,
    /// Dead letter reporter
    reporter: DeadLetterReporter,
    /// Stops the worker
    cancel: CancellationToken,
    /// Worker task, taken on shutdown
    worker: Mutex<Worker>,
}

impl ListenerHandle {
    /// Create a new ListenerHandle and its worker task
    ///
    /// Works with or without an ambient Tokio runtime.
    pub(crate) fn spawn<E, L>(
        id: u64,
        topic: Topic,
        listener: L,
        config: &DeliveryConfig,
        reporter: DeadLetterReporter,
        cancel: CancellationToken,
    ) -> Self
    where
        E: Send + Sync + 'static,
        L: Listener<E> + Sync + 'static,
    {
        let name = listener.name().to_string();
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let metrics = Arc::new(ListenerMetrics::new());

        let worker = WorkerContext {
            name: name.clone(),
            topic: topic.clone(),
            metrics: Arc::clone(&metrics),
            reporter: reporter.clone(),
            timeout: config.delivery_timeout(),
            cancel: cancel.clone(),
        };
        let future = listener_worker::<E, L>(listener, rx, worker).boxed();
        let worker = match Handle::try_current() {
            Ok(runtime) => Worker::Running(runtime.spawn(future)),
            Err(_) => {
                debug!(listener = %name, "No runtime yet, worker start deferred");
                Worker::Pending(future)
            }
        };

        Self {
            id,
            name,
            topic,
            event_type: type_name::<E>(),
            event_type_id: TypeId::of::<E>(),
            tx,
            metrics,
            reporter,
            cancel,
            worker: Mutex::new(worker),
        }
    }

    /// Spawn the worker if registration happened outside a runtime
    ///
    /// Returns true once the worker has been spawned, now or earlier.
    /// A no-op returning false when called outside a runtime.
    pub fn start(&self) -> bool {
        let mut worker = self.worker.lock();
        if !matches!(*worker, Worker::Pending(_)) {
            return matches!(*worker, Worker::Running(_));
        }
        let Ok(runtime) = Handle::try_current() else {
            return false;
        };
        if let Worker::Pending(future) = std::mem::replace(&mut *worker, Worker::Stopped) {
            *worker = Worker::Running(runtime.spawn(future));
            debug!(listener = %self.name, "Deferred worker started");
        }
        true
    }

    /// Registration sequence number (unique per registry)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get listener name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Topic the listener is registered on
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Type name of the events this listener accepts
    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<ListenerMetrics> {
        &self.metrics
    }

    /// No delivery is queued or in flight
    pub fn is_idle(&self) -> bool {
        self.metrics.pending() == 0
    }

    /// Worker task is still running
    pub fn is_running(&self) -> bool {
        match &*self.worker.lock() {
            Worker::Running(handle) => !handle.is_finished(),
            Worker::Pending(_) | Worker::Stopped => false,
        }
    }

    /// Whether the listener consumes events of type `T`
    pub fn accepts<T: 'static>(&self) -> bool {
        self.event_type_id == TypeId::of::<T>()
    }

    pub(crate) fn event_type_id(&self) -> TypeId {
        self.event_type_id
    }

    /// Drop an event of the wrong type without queueing it
    pub(crate) fn reject_shape(&self, dispatched: &'static str) {
        self.metrics.inc_failure_count();
        error!(
            listener = %self.name,
            expected = self.event_type,
            dispatched,
            "Event type does not match listener"
        );
        self.reporter.report(DeadLetter::delivery(
            self.topic.clone(),
            &self.name,
            DeadLetterReason::ShapeMismatch {
                expected: self.event_type,
            },
        ));
    }

    /// Send an event to the listener (non-blocking)
    pub(crate) fn try_deliver(&self, event: SharedEvent) -> DeliveryStatus {
        self.start();

        // Counted before the send so the worker can never decrement first
        self.metrics.inc_pending();

        match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                DeliveryStatus::Enqueued
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.dec_pending();
                self.metrics.inc_dropped_count();
                warn!(
                    listener = %self.name,
                    topic = %self.topic,
                    "Queue full, event dropped"
                );
                self.reporter.report(DeadLetter::delivery(
                    self.topic.clone(),
                    &self.name,
                    DeadLetterReason::QueueFull,
                ));
                DeliveryStatus::QueueFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.dec_pending();
                self.metrics.inc_dropped_count();
                error!(listener = %self.name, "Listener worker closed unexpectedly");
                self.reporter.report(DeadLetter::delivery(
                    self.topic.clone(),
                    &self.name,
                    DeadLetterReason::WorkerClosed,
                ));
                DeliveryStatus::Closed
            }
        }
    }

    /// Stop the worker and wait for it to exit
    ///
    /// Events still queued are discarded; an in-flight `on_event` is dropped
    /// at its next suspension point.
    #[instrument(name = "listener_handle_shutdown", skip(self), fields(listener = %self.name))]
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        // A deferred worker still runs once to release its queued events
        self.start();
        let worker = std::mem::replace(&mut *self.worker.lock(), Worker::Stopped);
        if let Worker::Running(handle) = worker {
            if let Err(e) = handle.await {
                error!(listener = %self.name, error = ?e, "Worker task panicked");
            }
        }
        debug!(listener = %self.name, "ListenerHandle shutdown complete");
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("topic", &self.topic)
            .field("event_type", &self.event_type)
            .finish()
    }
}

/// State owned by one worker task
struct WorkerContext {
    name: String,
    topic: Topic,
    metrics: Arc<ListenerMetrics>,
    reporter: DeadLetterReporter,
    timeout: Duration,
    cancel: CancellationToken,
}

impl WorkerContext {
    fn report(&self, reason: DeadLetterReason) {
        self.reporter
            .report(DeadLetter::delivery(self.topic.clone(), &self.name, reason));
    }

    /// Run one delivery. Returns false when the worker was cancelled mid-call.
    async fn deliver<E, L>(&self, listener: &L, event: &SharedEvent) -> bool
    where
        E: Send + Sync + 'static,
        L: Listener<E> + Sync,
    {
        let Some(event) = event.downcast_ref::<E>() else {
            self.metrics.inc_failure_count();
            error!(
                listener = %self.name,
                expected = type_name::<E>(),
                "Event type does not match listener"
            );
            self.report(DeadLetterReason::ShapeMismatch {
                expected: type_name::<E>(),
            });
            return true;
        };

        let started = Instant::now();
        let call = AssertUnwindSafe(listener.on_event(event)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(listener = %self.name, "Cancelled during delivery");
                return false;
            }
            outcome = tokio::time::timeout(self.timeout, call) => outcome,
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(Ok(Ok(()))) => {
                self.metrics.inc_delivered_count();
                observability::record_delivery(&self.name, true, latency_ms);
            }
            Ok(Ok(Err(e))) => {
                self.metrics.inc_failure_count();
                observability::record_delivery(&self.name, false, latency_ms);
                warn!(listener = %self.name, error = %e, "Listener failed");
                self.report(DeadLetterReason::ListenerFailed {
                    message: e.to_string(),
                });
            }
            Ok(Err(panic)) => {
                self.metrics.inc_panic_count();
                observability::record_delivery(&self.name, false, latency_ms);
                let message = panic_message(panic.as_ref());
                error!(listener = %self.name, panic = %message, "Listener panicked");
                self.report(DeadLetterReason::Panicked { message });
            }
            Err(_) => {
                self.metrics.inc_timeout_count();
                observability::record_delivery(&self.name, false, latency_ms);
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(listener = %self.name, timeout_ms, "Listener timed out");
                self.report(DeadLetterReason::TimedOut { timeout_ms });
            }
        }
        true
    }
}

/// Worker task that consumes events and calls the listener
#[instrument(
    name = "listener_worker_loop",
    skip(listener, rx, ctx),
    fields(listener = %ctx.name, topic = %ctx.topic)
)]
async fn listener_worker<E, L>(listener: L, mut rx: mpsc::Receiver<SharedEvent>, ctx: WorkerContext)
where
    E: Send + Sync + 'static,
    L: Listener<E> + Sync,
{
    debug!(listener = %ctx.name, "Listener worker started");

    loop {
        let event = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };

        ctx.metrics.set_queue_len(rx.len());
        observability::record_queue_depth(&ctx.name, rx.len());

        let keep_running = ctx.deliver::<E, L>(&listener, &event).await;
        ctx.metrics.dec_pending();
        if !keep_running {
            break;
        }
    }

    // Discarded events no longer count as pending
    rx.close();
    while rx.try_recv().is_ok() {
        ctx.metrics.dec_pending();
    }
    ctx.metrics.set_queue_len(0);

    debug!(listener = %ctx.name, "Listener worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ContractError;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::sleep;

    /// Mock listener for testing
    struct MockListener {
        name: String,
        seen: Arc<AtomicU64>,
        should_fail: bool,
        should_panic: bool,
        delay_ms: u64,
    }

    impl MockListener {
        fn new(name: &str, seen: &Arc<AtomicU64>) -> Self {
            Self {
                name: name.to_string(),
                seen: Arc::clone(seen),
                should_fail: false,
                should_panic: false,
                delay_ms: 0,
            }
        }
    }

    impl Listener<u64> for MockListener {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_event(&self, event: &u64) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.should_panic {
                panic!("mock panic on {event}");
            }
            if self.should_fail {
                return Err(ContractError::listener_failed(&self.name, "mock failure"));
            }
            self.seen.fetch_add(*event, Ordering::SeqCst);
            Ok(())
        }
    }

    fn topic() -> Topic {
        Topic::new("orders").unwrap()
    }

    fn config(queue_capacity: usize, delivery_timeout_ms: u64) -> DeliveryConfig {
        DeliveryConfig {
            queue_capacity,
            delivery_timeout_ms,
        }
    }

    fn spawn(listener: MockListener, config: &DeliveryConfig) -> ListenerHandle {
        ListenerHandle::spawn::<u64, _>(
            0,
            topic(),
            listener,
            config,
            DeadLetterReporter::logging(),
            CancellationToken::new(),
        )
    }

    async fn wait_idle(handle: &ListenerHandle) {
        for _ in 0..200 {
            if handle.is_idle() {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("listener never became idle");
    }

    #[tokio::test]
    async fn test_listener_handle_basic() {
        let seen = Arc::new(AtomicU64::new(0));
        let handle = spawn(MockListener::new("test", &seen), &config(10, 1_000));

        for i in 1..=5u64 {
            let event: SharedEvent = Arc::new(i);
            assert_eq!(handle.try_deliver(event), DeliveryStatus::Enqueued);
        }

        wait_idle(&handle).await;
        assert_eq!(seen.load(Ordering::SeqCst), 15);
        assert_eq!(handle.metrics().delivered_count(), 5);
        assert_eq!(handle.event_type(), "u64");

        handle.shutdown().await;
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_listener_handle_queue_full() {
        let seen = Arc::new(AtomicU64::new(0));
        let mut listener = MockListener::new("slow", &seen);
        listener.delay_ms = 100;

        let handle = spawn(listener, &config(2, 5_000));

        for i in 0..10u64 {
            handle.try_deliver(Arc::new(i));
        }

        assert!(handle.metrics().dropped_count() > 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_listener_handle_failure_isolation() {
        let seen = Arc::new(AtomicU64::new(0));
        let mut listener = MockListener::new("failing", &seen);
        listener.should_fail = true;

        let handle = spawn(listener, &config(10, 1_000));
        for i in 0..3u64 {
            handle.try_deliver(Arc::new(i));
        }

        wait_idle(&handle).await;
        assert_eq!(handle.metrics().failure_count(), 3);
        assert!(handle.is_running());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_listener_panic_does_not_kill_worker() {
        let seen = Arc::new(AtomicU64::new(0));
        let mut listener = MockListener::new("panicky", &seen);
        listener.should_panic = true;

        let handle = spawn(listener, &config(10, 1_000));
        handle.try_deliver(Arc::new(1u64));
        handle.try_deliver(Arc::new(2u64));

        wait_idle(&handle).await;
        assert_eq!(handle.metrics().panic_count(), 2);
        assert!(handle.is_running());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_listener_timeout() {
        let seen = Arc::new(AtomicU64::new(0));
        let mut listener = MockListener::new("stuck", &seen);
        listener.delay_ms = 10_000;

        let handle = spawn(listener, &config(4, 20));
        handle.try_deliver(Arc::new(1u64));
        handle.try_deliver(Arc::new(2u64));

        wait_idle(&handle).await;
        assert_eq!(handle.metrics().timeout_count(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_reported() {
        let seen = Arc::new(AtomicU64::new(0));
        let handle = spawn(MockListener::new("typed", &seen), &config(4, 1_000));

        let wrong: SharedEvent = Arc::new("not a number".to_string());
        assert_eq!(handle.try_deliver(wrong), DeliveryStatus::Enqueued);

        wait_idle(&handle).await;
        assert_eq!(handle.metrics().failure_count(), 1);
        assert_eq!(handle.metrics().delivered_count(), 0);
        handle.shutdown().await;
    }

    #[test]
    fn test_worker_deferred_until_runtime() {
        let seen = Arc::new(AtomicU64::new(0));
        let handle = spawn(MockListener::new("early", &seen), &config(4, 1_000));
        assert!(!handle.is_running());
        assert!(!handle.start());

        assert_eq!(handle.try_deliver(Arc::new(7u64)), DeliveryStatus::Enqueued);
        assert!(!handle.is_idle());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            assert!(handle.start());
            assert!(handle.is_running());
            wait_idle(&handle).await;
            assert_eq!(seen.load(Ordering::SeqCst), 7);
            handle.shutdown().await;
        });
        assert!(!handle.is_running());
    }

    #[test]
    fn test_accepts_matches_event_type() {
        let seen = Arc::new(AtomicU64::new(0));
        let handle = spawn(MockListener::new("typed", &seen), &config(4, 1_000));
        assert!(handle.accepts::<u64>());
        assert!(!handle.accepts::<String>());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_stuck_listener() {
        let seen = Arc::new(AtomicU64::new(0));
        let mut listener = MockListener::new("stuck", &seen);
        listener.delay_ms = 60_000;

        let handle = spawn(listener, &config(4, 120_000));
        handle.try_deliver(Arc::new(1u64));
        sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown should not wait for the stuck listener");
        assert_eq!(
            handle.try_deliver(Arc::new(2u64)),
            DeliveryStatus::Closed
        );
        assert!(handle.is_idle());
    }
}
