//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - Broker -> Consumer -> Dispatcher -> Listener 端到端测试
//! - 配置加载到运行的完整链路

#[cfg(test)]
mod contract_tests {
    use contracts::{ContractError, DeadLetter, DeadLetterReason, Topic};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_empty_topic_rejected() {
        let err = Topic::new("").unwrap_err();
        assert!(matches!(err, ContractError::EmptyIdentifier { .. }));
    }

    #[test]
    fn test_dead_letter_labels() {
        let topic = Topic::new("orders").unwrap();
        let letter = DeadLetter::delivery(topic, "audit", DeadLetterReason::QueueFull);
        assert_eq!(letter.reason.label(), "queue_full");
        assert_eq!(letter.listener.as_deref(), Some("audit"));
        assert!(letter.payload.is_none());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ContractError, DeadLetter, DeadLetterReason, DeliveryConfig, Listener, Topic};
    use dispatcher::{create_dispatcher, ChannelListener, DispatchOutcome, Dispatcher};
    use ingestion::{Consumer, InMemoryBroker, IngestionError};
    use parking_lot::Mutex;
    use serde::Deserialize;
    use tokio::sync::{mpsc, Notify};
    use tokio::time::timeout;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Order {
        id: u64,
        item: String,
    }

    fn topic(name: &str) -> Topic {
        Topic::new(name).unwrap()
    }

    fn order(id: u64) -> Vec<u8> {
        format!(r#"{{"id":{id},"item":"widget","extra":true}}"#).into_bytes()
    }

    fn collecting_dispatcher() -> (Dispatcher, Arc<Mutex<Vec<DeadLetter>>>) {
        let letters = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&letters);
        let dispatcher = Dispatcher::builder()
            .delivery(DeliveryConfig {
                queue_capacity: 16,
                delivery_timeout_ms: 200,
            })
            .on_dead_letter(Arc::new(move |letter: DeadLetter| sink.lock().push(letter)))
            .build();
        (dispatcher, letters)
    }

    async fn recv<T>(rx: &mut mpsc::Receiver<T>) -> T {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    /// Listener that panics on odd ids and forwards even ones
    struct Picky(mpsc::UnboundedSender<u64>);

    impl Listener<Order> for Picky {
        fn name(&self) -> &str {
            "picky"
        }

        async fn on_event(&self, event: &Order) -> Result<(), ContractError> {
            if event.id % 2 == 1 {
                panic!("odd order {}", event.id);
            }
            let _ = self.0.send(event.id);
            Ok(())
        }
    }

    /// Listener that never finishes until released
    struct Stuck {
        started: Arc<AtomicU64>,
        release: Arc<Notify>,
    }

    impl Listener<Order> for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn on_event(&self, _event: &Order) -> Result<(), ContractError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(())
        }
    }

    /// End-to-end: InMemoryBroker -> Consumer -> Dispatcher -> listeners
    ///
    /// 验证：
    /// 1. 每个 listener 恰好收到一次，内容一致
    /// 2. 坏消息不影响后续消息
    /// 3. 坏消息产生 dead letter 且无 listener 被调用
    #[tokio::test]
    async fn test_e2e_broker_to_listeners() {
        let broker = Arc::new(InMemoryBroker::new(32));
        broker.declare_queue(&topic("orders")).unwrap();

        let (dispatcher, letters) = collecting_dispatcher();
        let (l1, mut rx1) = ChannelListener::<Order>::new("L1", 16);
        let (l2, mut rx2) = ChannelListener::<Order>::new("L2", 16);
        dispatcher.register(topic("orders"), l1);
        dispatcher.register(topic("orders"), l2);

        let consumer = Consumer::connect("memory://e2e", Arc::clone(&broker)).unwrap();
        consumer
            .start_listening::<Order>("orders", "order-events", &dispatcher)
            .unwrap();

        broker.publish(&topic("orders"), order(1)).await.unwrap();
        broker
            .publish(&topic("orders"), &br#"{"id":"not a number"}"#[..])
            .await
            .unwrap();
        broker.publish(&topic("orders"), order(2)).await.unwrap();

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(recv(rx).await.id, 1);
            assert_eq!(recv(rx).await.id, 2);
        }

        broker.close();
        assert_eq!(consumer.join().await, 3);
        assert!(dispatcher.registry().wait_idle(Duration::from_secs(1)).await);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());

        let letters = letters.lock().clone();
        assert_eq!(letters.len(), 1);
        assert!(matches!(letters[0].reason, DeadLetterReason::Decode { .. }));
        assert!(letters[0].listener.is_none());

        dispatcher.registry().shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_topic_isolation_and_unknown_topic() {
        let broker = Arc::new(InMemoryBroker::new(8));
        broker.declare_queue(&topic("A")).unwrap();
        broker.declare_queue(&topic("B")).unwrap();

        let dispatcher = create_dispatcher(DeliveryConfig::default());
        let (only_a, mut rx) = ChannelListener::<Order>::new("only-a", 8);
        dispatcher.register(topic("A"), only_a);

        let consumer = Consumer::connect("memory://e2e", Arc::clone(&broker)).unwrap();
        consumer.start_listening::<Order>("A", "a", &dispatcher).unwrap();
        consumer.start_listening::<Order>("B", "b", &dispatcher).unwrap();

        broker.publish(&topic("B"), order(7)).await.unwrap();
        broker.publish(&topic("A"), order(8)).await.unwrap();

        assert_eq!(recv(&mut rx).await.id, 8);
        broker.close();
        consumer.join().await;

        assert!(rx.try_recv().is_err());
        let metrics = consumer.metrics().snapshot();
        assert_eq!(metrics.messages_received, 2);
        assert_eq!(metrics.unrouted, 1);

        dispatcher.registry().shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_stuck_listener_does_not_block_ingestion() {
        let broker = Arc::new(InMemoryBroker::new(8));
        broker.declare_queue(&topic("orders")).unwrap();

        let (dispatcher, _letters) = collecting_dispatcher();
        let started = Arc::new(AtomicU64::new(0));
        let release = Arc::new(Notify::new());
        dispatcher.register(
            topic("orders"),
            Stuck {
                started: Arc::clone(&started),
                release: Arc::clone(&release),
            },
        );
        let (fast, mut rx) = ChannelListener::<Order>::new("fast", 16);
        dispatcher.register(topic("orders"), fast);

        let consumer = Consumer::connect("memory://e2e", Arc::clone(&broker)).unwrap();
        consumer
            .start_listening::<Order>("orders", "c1", &dispatcher)
            .unwrap();

        for id in 0..5 {
            broker.publish(&topic("orders"), order(id)).await.unwrap();
        }
        for id in 0..5 {
            assert_eq!(recv(&mut rx).await.id, id);
        }
        assert_eq!(consumer.metrics().snapshot().messages_received, 5);

        release.notify_waiters();
        broker.close();
        consumer.join().await;
        dispatcher.registry().shutdown().await;
    }

    /// queue_capacity = 1: the stuck listener overflows, the fast one never does
    #[tokio::test]
    async fn test_e2e_queue_full_drops_only_the_slow_listener() {
        let letters = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&letters);
        let dispatcher = Dispatcher::builder()
            .delivery(DeliveryConfig {
                queue_capacity: 1,
                delivery_timeout_ms: 30_000,
            })
            .on_dead_letter(Arc::new(move |letter: DeadLetter| sink.lock().push(letter)))
            .build();

        let started = Arc::new(AtomicU64::new(0));
        let release = Arc::new(Notify::new());
        let stuck = dispatcher.register(
            topic("orders"),
            Stuck {
                started: Arc::clone(&started),
                release: Arc::clone(&release),
            },
        );
        let (fast, mut rx) = ChannelListener::<Order>::new("fast", 16);
        let fast = dispatcher.register(topic("orders"), fast);

        let mut dropped_total = 0;
        for id in 0..8 {
            let outcome = dispatcher.dispatch::<Order>(&topic("orders"), &order(id));
            let DispatchOutcome::Dispatched { enqueued, dropped } = outcome else {
                panic!("unexpected outcome {outcome:?}");
            };
            assert!(enqueued >= 1);
            assert!(dropped <= 1);
            dropped_total += dropped;

            // The fast listener drains before the next dispatch
            assert_eq!(recv(&mut rx).await.id, id);
        }

        assert!(dropped_total > 0);
        assert_eq!(fast.metrics().dropped_count(), 0);
        assert_eq!(stuck.metrics().dropped_count(), dropped_total as u64);
        assert_eq!(started.load(Ordering::SeqCst), 1);

        let letters = letters.lock().clone();
        assert_eq!(letters.len(), dropped_total);
        assert!(letters.iter().all(|l| {
            l.reason == DeadLetterReason::QueueFull && l.listener.as_deref() == Some("stuck")
        }));

        release.notify_waiters();
        dispatcher.registry().shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_panicking_listener_keeps_receiving() {
        let (dispatcher, letters) = collecting_dispatcher();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = dispatcher.register(topic("orders"), Picky(tx));

        for id in 1..=4 {
            dispatcher.dispatch::<Order>(&topic("orders"), &order(id));
        }

        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(4));
        assert!(dispatcher.registry().wait_idle(Duration::from_secs(1)).await);

        let snapshot = handle.metrics().snapshot();
        assert_eq!(snapshot.delivered_count, 2);
        assert_eq!(snapshot.panic_count, 2);

        let panics = letters
            .lock()
            .iter()
            .filter(|l| matches!(l.reason, DeadLetterReason::Panicked { .. }))
            .count();
        assert_eq!(panics, 2);

        dispatcher.registry().shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_competing_consumers_split_the_queue() {
        let broker = Arc::new(InMemoryBroker::new(64));
        broker.declare_queue(&topic("orders")).unwrap();

        let dispatcher = create_dispatcher(DeliveryConfig::default());
        let (listener, mut rx) = ChannelListener::<Order>::new("all", 64);
        dispatcher.register(topic("orders"), listener);

        let consumer = Consumer::connect("memory://e2e", Arc::clone(&broker)).unwrap();
        consumer
            .start_listening::<Order>("orders", "worker-1", &dispatcher)
            .unwrap();
        consumer
            .start_listening::<Order>("orders", "worker-2", &dispatcher)
            .unwrap();

        for id in 0..20 {
            broker.publish(&topic("orders"), order(id)).await.unwrap();
        }
        broker.close();
        assert_eq!(consumer.join().await, 20);

        let mut seen = HashSet::new();
        for _ in 0..20 {
            assert!(seen.insert(recv(&mut rx).await.id));
        }
        assert_eq!(seen.len(), 20);

        dispatcher.registry().shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_e2e_registration_during_dispatch() {
        let dispatcher = create_dispatcher(DeliveryConfig::default());
        let delivered = Arc::new(AtomicU64::new(0));

        struct Counter(Arc<AtomicU64>);

        impl Listener<Order> for Counter {
            fn name(&self) -> &str {
                "counter"
            }

            async fn on_event(&self, _event: &Order) -> Result<(), ContractError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let registrar = {
            let dispatcher = dispatcher.clone();
            let delivered = Arc::clone(&delivered);
            tokio::spawn(async move {
                for _ in 0..32 {
                    dispatcher.register(topic("orders"), Counter(Arc::clone(&delivered)));
                    tokio::task::yield_now().await;
                }
            })
        };
        let sender = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                for id in 0..32 {
                    dispatcher.dispatch::<Order>(&topic("orders"), &order(id));
                    tokio::task::yield_now().await;
                }
            })
        };
        registrar.await.unwrap();
        sender.await.unwrap();

        assert_eq!(dispatcher.registry().listener_count("orders"), 32);
        assert!(dispatcher.registry().wait_idle(Duration::from_secs(2)).await);
        let before = delivered.load(Ordering::SeqCst);
        assert!(before <= 32 * 32);

        dispatcher.dispatch::<Order>(&topic("orders"), &order(99));
        assert!(dispatcher.registry().wait_idle(Duration::from_secs(2)).await);
        assert_eq!(delivered.load(Ordering::SeqCst), before + 32);

        dispatcher.registry().shutdown().await;
    }

    /// 配置 -> broker -> consumer -> dispatcher 完整链路
    #[tokio::test]
    async fn test_e2e_from_config() {
        let toml = r#"
[broker]
url = "memory://config"
prefetch = 16

[delivery]
queue_capacity = 4
delivery_timeout_ms = 500

[[subscriptions]]
topic = "orders"
consumer_tag = "order-events"

[[subscriptions]]
topic = "refunds"
consumer_tag = "refund-events"
"#;
        let blueprint = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();
        let broker = Arc::new(InMemoryBroker::new(blueprint.broker.prefetch));
        let dispatcher = create_dispatcher(blueprint.delivery);
        assert_eq!(dispatcher.registry().config().queue_capacity, 4);

        let mut receivers = Vec::new();
        for sub in &blueprint.subscriptions {
            let t = topic(&sub.topic);
            broker.declare_queue(&t).unwrap();
            let (listener, rx) = ChannelListener::<serde_json::Value>::new(sub.topic.clone(), 8);
            dispatcher.register(t, listener);
            receivers.push(rx);
        }

        let consumer = Consumer::connect(&blueprint.broker.url, Arc::clone(&broker)).unwrap();
        for sub in &blueprint.subscriptions {
            consumer
                .start_listening::<serde_json::Value>(&sub.topic, &sub.consumer_tag, &dispatcher)
                .unwrap();
        }

        broker.publish(&topic("orders"), &br#"{"id":1}"#[..]).await.unwrap();
        broker.publish(&topic("refunds"), &br#"{"id":2}"#[..]).await.unwrap();

        assert_eq!(recv(&mut receivers[0]).await["id"], 1);
        assert_eq!(recv(&mut receivers[1]).await["id"], 2);

        assert_eq!(consumer.shutdown().await, 2);
        dispatcher.registry().shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_setup_errors_are_synchronous() {
        let broker = Arc::new(InMemoryBroker::new(8));
        let dispatcher = create_dispatcher(DeliveryConfig::default());

        assert!(Consumer::connect("", Arc::clone(&broker)).is_err());

        let consumer = Consumer::connect("memory://e2e", Arc::clone(&broker)).unwrap();
        let err = consumer
            .start_listening::<Order>("", "tag", &dispatcher)
            .unwrap_err();
        assert!(matches!(err, IngestionError::Config(_)));

        let err = consumer
            .start_listening::<Order>("orders", "tag", &dispatcher)
            .unwrap_err();
        assert!(matches!(err, IngestionError::UnknownQueue { .. }));
        assert_eq!(consumer.subscription_count(), 0);

        let bad = r#"
[broker]
url = ""

[[subscriptions]]
topic = "orders"
consumer_tag = "x"
"#;
        let err = ConfigLoader::load_from_str(bad, ConfigFormat::Toml).unwrap_err();
        assert!(err.is_config_error());
    }
}
