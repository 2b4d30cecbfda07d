// ============================================================================
// Order Domain
// ============================================================================
//
// Everything Order-specific:
// - Value objects (OrderItem, OrderStatus)
// - Aggregate (Order record, NewOrder, status history entry)
// - Events (OrderCreated, DeliveryStatusUpdate)
// - Commands (CreateOrderRequest and its validation)
// - Errors (OrderError)
// - Coordinator (OrderCoordinator, the lifecycle orchestration)
//
// ============================================================================

pub mod aggregate;
pub mod commands;
pub mod coordinator;
pub mod errors;
pub mod events;
pub mod value_objects;

pub use aggregate::*;
pub use commands::*;
pub use coordinator::*;
pub use errors::*;
pub use events::*;
pub use value_objects::*;
