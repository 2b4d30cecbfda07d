use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::domain::order::DomainEvent;
use crate::metrics::Metrics;
use crate::utils::{retry_with_backoff, BackoffPolicy, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

use super::envelope::{Delivery, LineOptions, LinkState, OutboundMessage, ORDER_ID_HEADER};
use super::transport::{Channel, Transport};
use super::BrokerError;

// ============================================================================
// Broker Client
// ============================================================================
//
// Owns the connection state for one service. Every component that publishes
// or consumes is handed the same Arc<BrokerClient>.
//
// - connect:  open a channel and declare both lines (durable, deduplicated).
//             A no-op when already connected.
// - publish:  Skipped when disconnected, otherwise a persistent message with
//             a fresh id used as both message id and deduplication key.
// - consume:  spawn a loop that acks on handler success and nacks without
//             requeue on failure, malformed body or panic.
// - close:    release the channel; idempotent.
//
// The client never remembers sent ids. Collapsing duplicates is the
// transport's job.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    OrderCreated,
    DeliveryStatus,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::OrderCreated => f.write_str("order-created"),
            Line::DeliveryStatus => f.write_str("delivery-status"),
        }
    }
}

/// Configured broker-side names of the delivery lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNames {
    pub order_created: String,
    pub delivery_status: String,
}

impl Default for LineNames {
    fn default() -> Self {
        Self {
            order_created: "order.created".to_string(),
            delivery_status: "delivery.updates".to_string(),
        }
    }
}

impl LineNames {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            order_created: config.order_created_line.clone(),
            delivery_status: config.delivery_updates_line.clone(),
        }
    }

    pub fn resolve(&self, line: Line) -> &str {
        match line {
            Line::OrderCreated => &self.order_created,
            Line::DeliveryStatus => &self.delivery_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent { message_id: String },
    /// Broker was disconnected; nothing was sent
    Skipped,
}

enum ConnectionState {
    Disconnected,
    Connected { channel: Arc<dyn Channel>, generation: u64 },
}

pub struct BrokerClient {
    transport: Arc<dyn Transport>,
    lines: LineNames,
    state: Arc<RwLock<ConnectionState>>,
    generation: AtomicU64,
    breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
    link_watcher: Mutex<Option<JoinHandle<()>>>,
    /// Serializes connect and close; the state lock is only held for swaps
    connect_lock: Mutex<()>,
}

impl BrokerClient {
    pub fn new(transport: Arc<dyn Transport>, lines: LineNames, metrics: Arc<Metrics>) -> Self {
        Self::with_circuit_breaker(transport, lines, metrics, CircuitBreakerConfig::default())
    }

    pub fn with_circuit_breaker(
        transport: Arc<dyn Transport>,
        lines: LineNames,
        metrics: Arc<Metrics>,
        breaker_config: CircuitBreakerConfig,
    ) -> Self {
        let gauge = metrics.clone();
        let breaker = CircuitBreaker::new("broker_publish", breaker_config)
            .with_transition_hook(move |state| gauge.set_circuit_state(state));

        Self {
            transport,
            lines,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            generation: AtomicU64::new(0),
            breaker,
            metrics,
            link_watcher: Mutex::new(None),
            connect_lock: Mutex::new(()),
        }
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.read().await, ConnectionState::Connected { .. })
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    pub async fn connect(&self) -> Result<(), BrokerError> {
        let _connecting = self.connect_lock.lock().await;
        if self.is_connected().await {
            return Ok(());
        }

        tracing::info!(url = %self.transport.describe(), "Connecting to message broker");

        let channel = match self.transport.open().await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to message broker");
                return Err(e);
            }
        };

        for line in [Line::OrderCreated, Line::DeliveryStatus] {
            let name = self.lines.resolve(line);
            if let Err(e) = channel.declare_line(name, LineOptions::durable_deduplicated()).await {
                tracing::error!(line = %name, error = %e, "Failed to declare delivery line");
                let _ = channel.close().await;
                return Err(e);
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            // The watcher blocks on this guard until the swap is visible
            let mut state = self.state.write().await;
            self.watch_link(channel.clone(), generation).await;
            *state = ConnectionState::Connected { channel, generation };
        }
        self.metrics.set_broker_connected(true);

        tracing::info!("Connected to message broker successfully");
        Ok(())
    }

    /// `connect` with exponential backoff on connection failures
    pub async fn connect_with_retry(&self, policy: &BackoffPolicy) -> Result<(), BrokerError> {
        retry_with_backoff(policy, BrokerError::is_transient, |_| self.connect()).await
    }

    /// Flip to disconnected when the transport reports the link down.
    /// The generation check keeps a stale watcher from touching a newer
    /// connection.
    async fn watch_link(&self, channel: Arc<dyn Channel>, generation: u64) {
        let mut link = channel.link_state();
        let state = self.state.clone();
        let metrics = self.metrics.clone();

        let watcher = tokio::spawn(async move {
            loop {
                let down = link.changed().await.is_err() || *link.borrow() == LinkState::Down;
                if !down {
                    continue;
                }

                let mut state = state.write().await;
                if matches!(*state, ConnectionState::Connected { generation: current, .. } if current == generation) {
                    *state = ConnectionState::Disconnected;
                    metrics.set_broker_connected(false);
                    tracing::warn!("Message broker connection lost");
                }
                break;
            }
        });

        if let Some(previous) = self.link_watcher.lock().await.replace(watcher) {
            previous.abort();
        }
    }

    async fn channel(&self) -> Option<Arc<dyn Channel>> {
        match &*self.state.read().await {
            ConnectionState::Connected { channel, .. } => Some(channel.clone()),
            ConnectionState::Disconnected => None,
        }
    }

    pub async fn publish<E>(&self, line: Line, event: &E) -> Result<PublishOutcome, BrokerError>
    where
        E: DomainEvent + Serialize + Sync,
    {
        let name = self.lines.resolve(line);
        let order_id = event.aggregate_id();

        let Some(channel) = self.channel().await else {
            tracing::warn!(
                line = %line,
                order_id = %order_id,
                event_type = event.event_type(),
                "Message broker not connected, skipping event"
            );
            self.metrics.record_publish(name, "skipped");
            return Ok(PublishOutcome::Skipped);
        };

        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                self.metrics.record_publish(name, "failed");
                return Err(e.into());
            }
        };

        let message_id = Uuid::new_v4().to_string();
        let message = OutboundMessage::persistent(message_id.clone(), payload)
            .with_header(ORDER_ID_HEADER, order_id.to_string());

        match self.breaker.call(channel.send(name, message)).await {
            Ok(()) => {
                self.metrics.record_publish(name, "sent");
                tracing::info!(
                    line = %line,
                    order_id = %order_id,
                    message_id = %message_id,
                    event_type = event.event_type(),
                    occurred_at = %event.timestamp(),
                    "Published event"
                );
                Ok(PublishOutcome::Sent { message_id })
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                self.metrics.record_publish(name, "failed");
                tracing::error!(line = %line, order_id = %order_id, "Circuit breaker open, event not published");
                Err(BrokerError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                self.metrics.record_publish(name, "failed");
                tracing::error!(line = %line, order_id = %order_id, error = %e, "Failed to publish event");
                Err(e)
            }
        }
    }

    /// Start draining `line`, decoding each body as `T`. Returns `None`
    /// when disconnected: nothing is registered in that case.
    pub async fn consume<T, F, Fut>(&self, line: Line, handler: F) -> Result<Option<JoinHandle<()>>, BrokerError>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = self.lines.resolve(line).to_string();

        let Some(channel) = self.channel().await else {
            tracing::warn!(line = %line, "Message broker not connected, cannot consume");
            return Ok(None);
        };

        let mut deliveries = channel.consume(&name).await?;
        let metrics = self.metrics.clone();

        let handle = tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                match process::<T, F, Fut>(&delivery, &handler).await {
                    Ok(()) => {
                        if let Err(e) = channel.ack(&delivery).await {
                            tracing::error!(line = %name, error = %e, "Failed to acknowledge message");
                        }
                        metrics.record_consume(&name, "acked");
                    }
                    Err(e) => {
                        tracing::error!(
                            line = %name,
                            message_id = %delivery.display_id(),
                            error = %e,
                            "Failed to process message, rejecting without requeue"
                        );
                        if let Err(e) = channel.nack(&delivery, false).await {
                            tracing::error!(line = %name, error = %e, "Failed to reject message");
                        }
                        metrics.record_consume(&name, "rejected");
                    }
                }
            }
            tracing::info!(line = %name, "Consumer loop stopped");
        });

        tracing::info!(line = %line, "Started consuming");
        Ok(Some(handle))
    }

    pub async fn close(&self) {
        let _connecting = self.connect_lock.lock().await;
        if let Some(watcher) = self.link_watcher.lock().await.take() {
            watcher.abort();
        }

        let previous = std::mem::replace(&mut *self.state.write().await, ConnectionState::Disconnected);
        if let ConnectionState::Connected { channel, .. } = previous {
            if let Err(e) = channel.close().await {
                tracing::warn!(error = %e, "Error while closing broker channel");
            }
            self.metrics.set_broker_connected(false);
            tracing::info!("Message broker connection closed");
        }
    }
}

/// Decode and run the handler. Malformed bodies and panics are failures.
async fn process<T, F, Fut>(delivery: &Delivery, handler: &F) -> anyhow::Result<()>
where
    T: DeserializeOwned,
    F: Fn(T) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let body = std::str::from_utf8(&delivery.payload)
        .map_err(|e| anyhow::anyhow!("message body is not UTF-8: {e}"))?;
    let event: T = serde_json::from_str(body).map_err(|e| anyhow::anyhow!("malformed message body: {e}"))?;

    tracing::info!(line = %delivery.line, message_id = %delivery.display_id(), "Received message");

    match AssertUnwindSafe(async { handler(event).await }).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("message handler panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{DeliveryStatusUpdateEvent, OrderStatus};
    use crate::messaging::InMemoryTransport;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn client(transport: &InMemoryTransport) -> BrokerClient {
        BrokerClient::new(
            Arc::new(transport.clone()),
            LineNames::default(),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    fn status_event() -> DeliveryStatusUpdateEvent {
        DeliveryStatusUpdateEvent::now(Uuid::new_v4(), OrderStatus::Shipped)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_publish_when_disconnected_is_skipped() {
        let transport = InMemoryTransport::default();
        let broker = client(&transport);

        let outcome = broker.publish(Line::DeliveryStatus, &status_event()).await.unwrap();

        assert_eq!(outcome, PublishOutcome::Skipped);
        assert_eq!(transport.stats().await.sent, 0);
    }

    #[tokio::test]
    async fn test_consume_when_disconnected_registers_nothing() {
        let broker = client(&InMemoryTransport::default());
        let handle = broker
            .consume(Line::DeliveryStatus, |_: DeliveryStatusUpdateEvent| async { anyhow::Ok(()) })
            .await
            .unwrap();
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let transport = InMemoryTransport::default();
        let broker = client(&transport);

        broker.connect().await.unwrap();
        broker.connect().await.unwrap();

        assert!(broker.is_connected().await);
        assert_eq!(broker.generation.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_publish_sends_fresh_ids() {
        let transport = InMemoryTransport::default();
        let broker = client(&transport);
        broker.connect().await.unwrap();

        let event = status_event();
        let first = broker.publish(Line::DeliveryStatus, &event).await.unwrap();
        let second = broker.publish(Line::DeliveryStatus, &event).await.unwrap();

        assert!(matches!(first, PublishOutcome::Sent { .. }));
        assert_ne!(first, second);
        assert_eq!(transport.stats().await.sent, 2);
    }

    #[tokio::test]
    async fn test_consume_acks_success_and_nacks_failure() {
        let transport = InMemoryTransport::default();
        let broker = client(&transport);
        broker.connect().await.unwrap();

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        broker
            .consume(Line::DeliveryStatus, move |event: DeliveryStatusUpdateEvent| {
                let seen_tx = seen_tx.clone();
                async move {
                    let _ = seen_tx.send(event.status);
                    if event.status == OrderStatus::Delivered {
                        anyhow::bail!("cannot handle delivered");
                    }
                    anyhow::Ok(())
                }
            })
            .await
            .unwrap();

        let order_id = Uuid::new_v4();
        broker
            .publish(Line::DeliveryStatus, &DeliveryStatusUpdateEvent::now(order_id, OrderStatus::Shipped))
            .await
            .unwrap();
        broker
            .publish(Line::DeliveryStatus, &DeliveryStatusUpdateEvent::now(order_id, OrderStatus::Delivered))
            .await
            .unwrap();

        assert_eq!(seen_rx.recv().await, Some(OrderStatus::Shipped));
        assert_eq!(seen_rx.recv().await, Some(OrderStatus::Delivered));
        settle().await;

        let stats = transport.stats().await;
        assert_eq!(stats.acked, 1);
        assert_eq!(stats.nacked, 1);
        assert_eq!(stats.requeued, 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_nacked_and_loop_survives() {
        let transport = InMemoryTransport::default();
        let broker = client(&transport);
        broker.connect().await.unwrap();

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let handle = broker
            .consume(Line::DeliveryStatus, move |event: DeliveryStatusUpdateEvent| {
                let seen_tx = seen_tx.clone();
                async move {
                    let _ = seen_tx.send(event.order_id);
                    anyhow::Ok(())
                }
            })
            .await
            .unwrap()
            .unwrap();

        transport
            .inject("delivery.updates", OutboundMessage::persistent("bad", b"not json".to_vec()))
            .await
            .unwrap();
        let event = status_event();
        broker.publish(Line::DeliveryStatus, &event).await.unwrap();

        assert_eq!(seen_rx.recv().await, Some(event.order_id));
        settle().await;

        let stats = transport.stats().await;
        assert_eq!(stats.nacked, 1);
        assert_eq!(stats.acked, 1);
        assert!(!handle.is_finished());
    }

    #[tokio::test]
    async fn test_panicking_handler_is_nacked() {
        let transport = InMemoryTransport::default();
        let broker = client(&transport);
        broker.connect().await.unwrap();

        let handle = broker
            .consume(Line::DeliveryStatus, |event: DeliveryStatusUpdateEvent| async move {
                assert!(event.order_id.is_nil(), "handler bug");
                anyhow::Ok(())
            })
            .await
            .unwrap()
            .unwrap();

        broker.publish(Line::DeliveryStatus, &status_event()).await.unwrap();
        settle().await;

        assert_eq!(transport.stats().await.nacked, 1);
        assert!(!handle.is_finished());
    }

    #[tokio::test]
    async fn test_link_loss_degrades_publish_to_skip() {
        let transport = InMemoryTransport::default();
        let broker = client(&transport);
        broker.connect().await.unwrap();

        transport.drop_link().await;
        settle().await;

        assert!(!broker.is_connected().await);
        let outcome = broker.publish(Line::DeliveryStatus, &status_event()).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Skipped);

        broker.connect().await.unwrap();
        assert!(broker.is_connected().await);
    }

    #[tokio::test]
    async fn test_publish_failures_open_the_circuit() {
        let transport = InMemoryTransport::default();
        let broker = BrokerClient::with_circuit_breaker(
            Arc::new(transport.clone()),
            LineNames::default(),
            Arc::new(Metrics::new().unwrap()),
            CircuitBreakerConfig {
                failure_threshold: 2,
                open_for: Duration::from_secs(30),
                success_threshold: 1,
            },
        );
        broker.connect().await.unwrap();
        transport.set_fail_sends(true);

        for _ in 0..2 {
            let err = broker.publish(Line::OrderCreated, &status_event()).await.unwrap_err();
            assert!(matches!(err, BrokerError::Publish(_)));
        }

        transport.set_fail_sends(false);
        let err = broker.publish(Line::OrderCreated, &status_event()).await.unwrap_err();
        assert!(matches!(err, BrokerError::CircuitOpen));
        assert_eq!(broker.circuit_state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        let transport = InMemoryTransport::default();
        transport.set_refuse_connections(true);
        let broker = client(&transport);

        let policy = BackoffPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        };
        let err = broker.connect_with_retry(&policy).await.unwrap_err();

        assert!(matches!(err, BrokerError::Connection(_)));
        assert!(!broker.is_connected().await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_safe_unconnected() {
        let transport = InMemoryTransport::default();
        let broker = client(&transport);

        broker.close().await;
        broker.connect().await.unwrap();
        broker.close().await;
        broker.close().await;

        assert!(!broker.is_connected().await);
    }

    /// Holds `open` until released
    struct GatedTransport {
        inner: InMemoryTransport,
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
        opens: AtomicU64,
    }

    #[async_trait::async_trait]
    impl Transport for GatedTransport {
        async fn open(&self) -> Result<Arc<dyn Channel>, BrokerError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.open().await
        }

        fn describe(&self) -> String {
            "gated://local".to_string()
        }
    }

    #[tokio::test]
    async fn test_slow_connect_does_not_block_readers() {
        let transport = InMemoryTransport::default();
        let gated = Arc::new(GatedTransport {
            inner: transport.clone(),
            entered: Arc::new(tokio::sync::Notify::new()),
            release: Arc::new(tokio::sync::Notify::new()),
            opens: AtomicU64::new(0),
        });
        let broker = Arc::new(BrokerClient::new(
            gated.clone(),
            LineNames::default(),
            Arc::new(Metrics::new().unwrap()),
        ));

        let first = tokio::spawn({
            let broker = broker.clone();
            async move { broker.connect().await }
        });
        gated.entered.notified().await;

        // Open is parked; state reads and publishes still answer
        let limit = Duration::from_millis(500);
        assert!(!tokio::time::timeout(limit, broker.is_connected()).await.unwrap());
        let outcome = tokio::time::timeout(limit, broker.publish(Line::DeliveryStatus, &status_event()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Skipped);

        let second = tokio::spawn({
            let broker = broker.clone();
            async move { broker.connect().await }
        });
        gated.release.notify_one();

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert!(broker.is_connected().await);
        assert_eq!(gated.opens.load(Ordering::SeqCst), 1);
    }
}
