use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregate::Order;
use super::value_objects::{OrderItem, OrderStatus};

// ============================================================================
// Order Lifecycle Events - carried between services over the broker
// ============================================================================

/// Base trait for every event that travels over a delivery line
pub trait DomainEvent {
    fn event_type(&self) -> &'static str;
    fn aggregate_id(&self) -> Uuid;
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Published once by the sales side after an order is persisted
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderCreatedEvent {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_id: order.customer_id.clone(),
            items: order.items.clone(),
            total_amount: order.total_amount,
            created_at: order.created_at,
        }
    }
}

impl DomainEvent for OrderCreatedEvent {
    fn event_type(&self) -> &'static str {
        "OrderCreated"
    }

    fn aggregate_id(&self) -> Uuid {
        self.order_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Published by the delivery side for every accepted status command
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeliveryStatusUpdateEvent {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryStatusUpdateEvent {
    pub fn now(order_id: Uuid, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            updated_at: Utc::now(),
        }
    }
}

impl DomainEvent for DeliveryStatusUpdateEvent {
    fn event_type(&self) -> &'static str {
        "DeliveryStatusUpdated"
    }

    fn aggregate_id(&self) -> Uuid {
        self.order_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
