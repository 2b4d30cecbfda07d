use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::order::{NewOrder, Order, OrderStatus, OrderStatusHistory};

use super::{OrderStore, StoreError};

struct OrderEntry {
    order: Order,
    history: Vec<OrderStatusHistory>,
}

/// In-process order store. Each order sits behind its own lock so that
/// updates to one order never block another.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Arc<Mutex<OrderEntry>>>>,
    next_history_id: AtomicI64,
    fail_history_writes: AtomicBool,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    /// Make every following history append fail after the order write.
    pub fn set_fail_history_writes(&self, fail: bool) {
        self.fail_history_writes.store(fail, Ordering::SeqCst);
    }

    fn history_entry(&self, order_id: Uuid, status: OrderStatus) -> Result<OrderStatusHistory, StoreError> {
        if self.fail_history_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "failed to append status history for order {order_id}"
            )));
        }

        Ok(OrderStatusHistory {
            id: self.next_history_id.fetch_add(1, Ordering::SeqCst) + 1,
            order_id,
            status,
            changed_at: Utc::now(),
        })
    }

    async fn entry(&self, order_id: Uuid) -> Option<Arc<Mutex<OrderEntry>>> {
        self.orders.read().await.get(&order_id).cloned()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order, StoreError> {
        let order_id = order.id;
        let status = order.status;
        let order = order.into_order(Utc::now());

        let entry = {
            let mut orders = self.orders.write().await;
            if orders.contains_key(&order_id) {
                tracing::error!(order_id = %order_id, "Refusing to overwrite existing order");
                return Err(StoreError::Conflict(order_id));
            }
            let entry = Arc::new(Mutex::new(OrderEntry {
                order: order.clone(),
                history: Vec::new(),
            }));
            orders.insert(order_id, entry.clone());
            entry
        };

        // The order row stays even if the history append fails
        let history = self.history_entry(order_id, status)?;
        entry.lock().await.history.push(history);

        tracing::info!(order_id = %order_id, "Order created successfully");
        Ok(order)
    }

    async fn get_by_id(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        match self.entry(order_id).await {
            Some(entry) => Ok(Some(entry.lock().await.order.clone())),
            None => Ok(None),
        }
    }

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<bool, StoreError> {
        let Some(entry) = self.entry(order_id).await else {
            tracing::warn!(order_id = %order_id, "Order not found for status update");
            return Ok(false);
        };

        let mut entry = entry.lock().await;
        entry.order.apply_status(status, Utc::now());
        let history = self.history_entry(order_id, status)?;
        entry.history.push(history);

        tracing::info!(order_id = %order_id, new_status = %status, "Order status updated");
        Ok(true)
    }

    async fn status_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>, StoreError> {
        match self.entry(order_id).await {
            Some(entry) => Ok(entry.lock().await.history.clone()),
            None => Ok(Vec::new()),
        }
    }
}
