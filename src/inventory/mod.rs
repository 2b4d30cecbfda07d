// ============================================================================
// Inventory Gateway
// ============================================================================
//
// Synchronous availability check against the inventory service. The check
// gates order creation; failures are never read as "available" or
// "unavailable", they surface as InventoryError.
//
// ============================================================================

mod gateway;

pub use gateway::{HttpInventoryGateway, InventoryError, InventoryGateway};
