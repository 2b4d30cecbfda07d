// ============================================================================
// Envelope - what travels over a delivery line
// ============================================================================

/// Primary message identifier
pub const MESSAGE_ID_HEADER: &str = "message-id";
/// Deduplication key the broker collapses repeated sends on
pub const DEDUP_HEADER: &str = "x-deduplication-header";
/// Order the event belongs to, for observability and routing
pub const ORDER_ID_HEADER: &str = "x-order-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineOptions {
    pub durable: bool,
    pub deduplicate: bool,
}

impl LineOptions {
    pub fn durable_deduplicated() -> Self {
        Self {
            durable: true,
            deduplicate: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub message_id: String,
    pub payload: Vec<u8>,
    pub persistent: bool,
    pub headers: Vec<(String, String)>,
}

impl OutboundMessage {
    /// Persistent message whose id doubles as its deduplication key
    pub fn persistent(message_id: impl Into<String>, payload: Vec<u8>) -> Self {
        let message_id = message_id.into();
        Self {
            headers: vec![
                (MESSAGE_ID_HEADER.to_string(), message_id.clone()),
                (DEDUP_HEADER.to_string(), message_id.clone()),
            ],
            message_id,
            payload,
            persistent: true,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn dedup_key(&self) -> &str {
        self.header(DEDUP_HEADER).unwrap_or(&self.message_id)
    }
}

/// Transport-assigned handle used to acknowledge one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryTag(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub line: String,
    pub message_id: Option<String>,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
    pub redelivered: bool,
}

impl Delivery {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Best identifier for logging: message id, then dedup header, then tag
    pub fn display_id(&self) -> String {
        self.message_id
            .clone()
            .or_else(|| self.header(DEDUP_HEADER).map(str::to_string))
            .unwrap_or_else(|| format!("msg-{}", self.tag.0))
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistent_message_carries_id_twice() {
        let message = OutboundMessage::persistent("m-1", b"{}".to_vec()).with_header(ORDER_ID_HEADER, "o-1");

        assert!(message.persistent);
        assert_eq!(message.header(MESSAGE_ID_HEADER), Some("m-1"));
        assert_eq!(message.dedup_key(), "m-1");
        assert_eq!(message.header(ORDER_ID_HEADER), Some("o-1"));
    }

    #[test]
    fn test_display_id_fallbacks() {
        let mut delivery = Delivery {
            tag: DeliveryTag(7),
            line: "order.created".into(),
            message_id: None,
            payload: Vec::new(),
            headers: vec![(DEDUP_HEADER.into(), "dedup-1".into())],
            redelivered: false,
        };
        assert_eq!(delivery.display_id(), "dedup-1");

        delivery.headers.clear();
        assert_eq!(delivery.display_id(), "msg-7");
    }
}
