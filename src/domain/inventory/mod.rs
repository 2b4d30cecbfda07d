// ============================================================================
// Inventory Domain
// ============================================================================
//
// - availability: request/response records of the availability check
// - catalog:      the fixed product table the inventory service answers from
//
// ============================================================================

pub mod availability;
pub mod catalog;

pub use availability::*;
pub use catalog::*;
