use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use super::envelope::{Delivery, LineOptions, LinkState, OutboundMessage};
use super::BrokerError;

/// A broker backend. `open` yields a live channel or a connection error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn Channel>, BrokerError>;

    /// Broker address for logs, credentials masked
    fn describe(&self) -> String;
}

/// One open session with the broker.
///
/// Lines declared with `deduplicate` collapse repeated `x-deduplication-header`
/// values: only the first delivery of a key reaches a consumer.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn declare_line(&self, line: &str, options: LineOptions) -> Result<(), BrokerError>;

    async fn send(&self, line: &str, message: OutboundMessage) -> Result<(), BrokerError>;

    /// Manual-ack subscription. The receiver closes when the channel does.
    async fn consume(&self, line: &str) -> Result<mpsc::Receiver<Delivery>, BrokerError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Without `requeue` the message is dropped for good.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError>;

    fn link_state(&self) -> watch::Receiver<LinkState>;

    async fn close(&self) -> Result<(), BrokerError>;
}
