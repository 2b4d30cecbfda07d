// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - order:     order record, lifecycle events, validation, coordinator
// - inventory: availability wire types and the fixed product catalog
//
// Nothing in here knows about HTTP; transports and stores are reached only
// through the traits in db, inventory and messaging.
//
// ============================================================================

pub mod inventory;
pub mod order;
