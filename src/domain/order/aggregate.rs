use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{OrderItem, OrderStatus};

// ============================================================================
// Order Record
// ============================================================================
//
// The durable representation owned by the order store. Only `status` and
// `updated_at` change after creation; `items` are fixed at creation time.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order that has passed validation and availability but has not been
/// persisted yet. The store assigns the timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub id: Uuid,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub status: OrderStatus,
}

impl NewOrder {
    /// Fresh id, `PendingShipment`, and a zero total (totals are not priced).
    pub fn pending(customer_id: impl Into<String>, items: Vec<OrderItem>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id: customer_id.into(),
            items,
            total_amount: 0.0,
            status: OrderStatus::PendingShipment,
        }
    }

    pub fn into_order(self, at: DateTime<Utc>) -> Order {
        Order {
            id: self.id,
            customer_id: self.customer_id,
            items: self.items,
            total_amount: self.total_amount,
            status: self.status,
            created_at: at,
            updated_at: at,
        }
    }
}

impl Order {
    /// Overwrite the status. `updated_at` never moves backwards.
    pub fn apply_status(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.status = status;
        if at > self.updated_at {
            self.updated_at = at;
        }
    }
}

/// Append-only audit entry. One per status the order has held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub id: i64,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_pending_order_defaults() {
        let order = NewOrder::pending("c1", vec![OrderItem::new("p1", 2)]);

        assert_eq!(order.status, OrderStatus::PendingShipment);
        assert_eq!(order.total_amount, 0.0);
        assert_eq!(order.items, vec![OrderItem::new("p1", 2)]);
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = NewOrder::pending("c1", vec![OrderItem::new("p1", 1)]);
        let b = NewOrder::pending("c1", vec![OrderItem::new("p1", 1)]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_apply_status_keeps_updated_at_monotonic() {
        let created = Utc::now();
        let mut order = NewOrder::pending("c1", vec![OrderItem::new("p1", 1)]).into_order(created);

        order.apply_status(OrderStatus::Shipped, created + Duration::seconds(5));
        assert_eq!(order.updated_at, created + Duration::seconds(5));

        // A clock going backwards must not rewind updated_at
        order.apply_status(OrderStatus::Delivered, created);
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.updated_at, created + Duration::seconds(5));
        assert_eq!(order.created_at, created);
    }
}
