// ============================================================================
// Services - collaborator logic that is not part of the order lifecycle
// ============================================================================

pub mod delivery;

pub use delivery::DeliveryService;
