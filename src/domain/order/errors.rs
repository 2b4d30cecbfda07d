use uuid::Uuid;

use crate::db::StoreError;
use crate::domain::inventory::UnavailableItem;
use crate::inventory::InventoryError;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Lifecycle Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    /// Malformed client input; nothing was written
    #[error("{0}")]
    Validation(String),

    /// At least one item is missing or short-stocked
    #[error("Some products are not available")]
    Unavailable { items: Vec<UnavailableItem> },

    /// The synchronous availability dependency failed
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("Order {0} not found")]
    NotFound(Uuid),

    #[error("Invalid status: {0}. Must be one of: Shipped, Delivered")]
    InvalidStatus(OrderStatus),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    /// Whether an external caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::Inventory(_))
    }
}
