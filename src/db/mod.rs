// ============================================================================
// Order Store
// ============================================================================
//
// Durable keyed record store for orders plus an append-only status history.
//
// - postgres: production store (sqlx, one transaction per write)
// - memory:   in-process store used by tests and local development
//
// Concurrent writes to the same order are serialized per record; writes to
// different orders never wait on each other. Last write wins.
//
// ============================================================================

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::order::{NewOrder, Order, OrderStatus, OrderStatusHistory};

pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An order with this id already exists. Never overwritten.
    #[error("order {0} already exists")]
    Conflict(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A persisted row could not be mapped back into an order
    #[error("corrupt order record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert the order and its initial history entry. Timestamps are
    /// assigned by the store.
    async fn create(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn get_by_id(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Returns `false` when no such order exists.
    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<bool, StoreError>;

    /// Audit trail, oldest first
    async fn status_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>, StoreError>;
}
