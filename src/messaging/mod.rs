// ============================================================================
// Messaging - Broker Client and its transports
// ============================================================================
//
// - broker:    BrokerClient (connection state, publish, consume, close)
// - transport: the Transport / Channel seam every broker backend implements
// - envelope:  wire-level message, delivery and header names
// - dedup:     bounded window collapsing repeated deduplication keys
// - redpanda:  rdkafka backend (topics, acks=all, offset commits)
// - memory:    in-process backend with the same contract
//
// ============================================================================

pub mod broker;
pub mod dedup;
pub mod envelope;
pub mod memory;
pub mod redpanda;
pub mod transport;

pub use broker::{BrokerClient, Line, LineNames, PublishOutcome};
pub use dedup::DeduplicationWindow;
pub use envelope::{Delivery, DeliveryTag, LineOptions, LinkState, OutboundMessage};
pub use memory::{InMemoryTransport, TransportStats};
pub use redpanda::RedpandaTransport;
pub use transport::{Channel, Transport};

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("acknowledgement failed: {0}")]
    Acknowledge(String),

    #[error("publish circuit breaker is open")]
    CircuitOpen,

    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BrokerError {
    /// Connection failures are worth retrying; everything else is final
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Connection(_))
    }
}
