use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};

use super::dedup::DeduplicationWindow;
use super::envelope::{Delivery, DeliveryTag, LineOptions, LinkState, OutboundMessage};
use super::transport::{Channel, Transport};
use super::BrokerError;

// ============================================================================
// In-Memory Transport
// ============================================================================
//
// A single-process broker with the same contract as the Redpanda backend:
// durable lines survive channel reconnects, deduplicated lines collapse
// repeated keys at send time, and every delivery must be acked or nacked.
// Fault injection hooks let tests drop the link or fail sends.
//
// ============================================================================

const CONSUMER_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub sent: u64,
    pub duplicates_dropped: u64,
    pub delivered: u64,
    pub acked: u64,
    pub nacked: u64,
    pub requeued: u64,
}

struct LineState {
    options: LineOptions,
    dedup: Option<DeduplicationWindow>,
    backlog: VecDeque<Delivery>,
    consumer: Option<mpsc::Sender<Delivery>>,
}

struct BrokerState {
    lines: HashMap<String, LineState>,
    unacked: HashMap<DeliveryTag, Delivery>,
    stats: TransportStats,
}

struct Broker {
    state: Mutex<BrokerState>,
    link: watch::Sender<LinkState>,
    next_tag: AtomicU64,
    /// Bumped on every link drop; channels from an older epoch are dead
    epoch: AtomicU64,
    refuse_connections: AtomicBool,
    fail_sends: AtomicBool,
    dedup_capacity: usize,
    dedup_ttl: Duration,
}

#[derive(Clone)]
pub struct InMemoryTransport {
    broker: Arc<Broker>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(86_400))
    }
}

impl InMemoryTransport {
    pub fn new(dedup_capacity: usize, dedup_ttl: Duration) -> Self {
        let (link, _) = watch::channel(LinkState::Down);
        Self {
            broker: Arc::new(Broker {
                state: Mutex::new(BrokerState {
                    lines: HashMap::new(),
                    unacked: HashMap::new(),
                    stats: TransportStats::default(),
                }),
                link,
                next_tag: AtomicU64::new(1),
                epoch: AtomicU64::new(0),
                refuse_connections: AtomicBool::new(false),
                fail_sends: AtomicBool::new(false),
                dedup_capacity,
                dedup_ttl,
            }),
        }
    }

    pub async fn stats(&self) -> TransportStats {
        self.broker.state.lock().await.stats
    }

    /// Messages not yet handed to a consumer
    pub async fn backlog(&self, line: &str) -> usize {
        self.broker
            .state
            .lock()
            .await
            .lines
            .get(line)
            .map_or(0, |l| l.backlog.len())
    }

    pub fn set_refuse_connections(&self, refuse: bool) {
        self.broker.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.broker.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Simulate connection loss: link goes down and consumers are detached.
    pub async fn drop_link(&self) {
        let mut state = self.broker.state.lock().await;
        for line in state.lines.values_mut() {
            line.consumer = None;
        }
        self.broker.epoch.fetch_add(1, Ordering::SeqCst);
        self.broker.link.send_replace(LinkState::Down);
        tracing::warn!("In-memory broker link dropped");
    }

    /// Push raw bytes onto a line, bypassing any client-side encoding.
    pub async fn inject(&self, line: &str, message: OutboundMessage) -> Result<(), BrokerError> {
        self.broker.enqueue(line, message).await
    }
}

impl Broker {
    async fn enqueue(&self, line: &str, message: OutboundMessage) -> Result<(), BrokerError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish(format!("send to {line} rejected by broker")));
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(line_state) = state.lines.get_mut(line) else {
            return Err(BrokerError::Publish(format!("line {line} has not been declared")));
        };

        if let Some(window) = line_state.dedup.as_mut() {
            if !window.first_sighting(message.dedup_key()) {
                state.stats.duplicates_dropped += 1;
                tracing::debug!(line = %line, dedup_key = %message.dedup_key(), "Duplicate message suppressed");
                return Ok(());
            }
        }

        let delivery = Delivery {
            tag: DeliveryTag(self.next_tag.fetch_add(1, Ordering::SeqCst)),
            line: line.to_string(),
            message_id: Some(message.message_id),
            payload: message.payload,
            headers: message.headers,
            redelivered: false,
        };

        state.stats.sent += 1;
        dispatch(line_state, &mut state.unacked, &mut state.stats, delivery);
        Ok(())
    }
}

/// Queue a delivery behind anything already waiting on the line.
fn dispatch(
    line: &mut LineState,
    unacked: &mut HashMap<DeliveryTag, Delivery>,
    stats: &mut TransportStats,
    delivery: Delivery,
) {
    line.backlog.push_back(delivery);
    pump(line, unacked, stats);
}

/// Move backlog into the consumer while its buffer has room. Never waits,
/// so it may run under the state lock; whatever does not fit is picked up
/// again on the next ack or nack.
fn pump(line: &mut LineState, unacked: &mut HashMap<DeliveryTag, Delivery>, stats: &mut TransportStats) {
    while let Some(delivery) = line.backlog.pop_front() {
        let Some(consumer) = &line.consumer else {
            line.backlog.push_front(delivery);
            return;
        };

        match consumer.try_send(delivery.clone()) {
            Ok(()) => {
                unacked.insert(delivery.tag, delivery);
                stats.delivered += 1;
            }
            Err(TrySendError::Full(_)) => {
                line.backlog.push_front(delivery);
                return;
            }
            Err(TrySendError::Closed(_)) => {
                line.consumer = None;
                line.backlog.push_front(delivery);
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn open(&self) -> Result<Arc<dyn Channel>, BrokerError> {
        if self.broker.refuse_connections.load(Ordering::SeqCst) {
            return Err(BrokerError::Connection("in-memory broker refused connection".to_string()));
        }

        self.broker.link.send_replace(LinkState::Up);
        Ok(Arc::new(MemoryChannel {
            broker: self.broker.clone(),
            epoch: self.broker.epoch.load(Ordering::SeqCst),
            closed: AtomicBool::new(false),
            consuming: std::sync::Mutex::new(Vec::new()),
        }))
    }

    fn describe(&self) -> String {
        "memory://local".to_string()
    }
}

struct MemoryChannel {
    broker: Arc<Broker>,
    epoch: u64,
    closed: AtomicBool,
    /// Lines this channel attached a consumer to
    consuming: std::sync::Mutex<Vec<String>>,
}

impl MemoryChannel {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) || self.broker.epoch.load(Ordering::SeqCst) != self.epoch {
            return Err(BrokerError::Connection("channel is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn declare_line(&self, line: &str, options: LineOptions) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.state.lock().await;

        let entry = state.lines.entry(line.to_string()).or_insert_with(|| LineState {
            options,
            dedup: None,
            backlog: VecDeque::new(),
            consumer: None,
        });
        if !entry.options.durable {
            entry.backlog.clear();
        }
        entry.options = options;
        if options.deduplicate && entry.dedup.is_none() {
            entry.dedup = Some(DeduplicationWindow::new(self.broker.dedup_capacity, self.broker.dedup_ttl));
        }

        Ok(())
    }

    async fn send(&self, line: &str, message: OutboundMessage) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.broker.enqueue(line, message).await
    }

    async fn consume(&self, line: &str) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        self.ensure_open()?;
        let (tx, rx) = mpsc::channel(CONSUMER_BUFFER);

        let mut guard = self.broker.state.lock().await;
        let state = &mut *guard;
        let Some(line_state) = state.lines.get_mut(line) else {
            return Err(BrokerError::Subscribe(format!("line {line} has not been declared")));
        };

        line_state.consumer = Some(tx);
        if let Ok(mut consuming) = self.consuming.lock() {
            consuming.push(line.to_string());
        }
        pump(line_state, &mut state.unacked, &mut state.stats);

        Ok(rx)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut guard = self.broker.state.lock().await;
        let state = &mut *guard;
        if state.unacked.remove(&delivery.tag).is_none() {
            return Err(BrokerError::Acknowledge(format!("unknown delivery tag {}", delivery.tag.0)));
        }
        state.stats.acked += 1;

        if let Some(line_state) = state.lines.get_mut(&delivery.line) {
            pump(line_state, &mut state.unacked, &mut state.stats);
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError> {
        let mut guard = self.broker.state.lock().await;
        let state = &mut *guard;
        let Some(mut original) = state.unacked.remove(&delivery.tag) else {
            return Err(BrokerError::Acknowledge(format!("unknown delivery tag {}", delivery.tag.0)));
        };
        state.stats.nacked += 1;

        if requeue {
            if let Some(line_state) = state.lines.get_mut(&original.line) {
                original.redelivered = true;
                state.stats.requeued += 1;
                dispatch(line_state, &mut state.unacked, &mut state.stats, original);
            }
        } else if let Some(line_state) = state.lines.get_mut(&delivery.line) {
            pump(line_state, &mut state.unacked, &mut state.stats);
        }

        Ok(())
    }

    fn link_state(&self) -> watch::Receiver<LinkState> {
        self.broker.link.subscribe()
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let lines = match self.consuming.lock() {
            Ok(mut consuming) => std::mem::take(&mut *consuming),
            Err(_) => Vec::new(),
        };
        let mut state = self.broker.state.lock().await;
        for line in lines {
            if let Some(line_state) = state.lines.get_mut(&line) {
                line_state.consumer = None;
            }
        }
        Ok(())
    }
}
