// ============================================================================
// Order Fulfillment
// ============================================================================
//
// Three cooperating services built from one crate:
// - sales:     accepts orders, checks inventory, persists, publishes
// - inventory: answers availability checks from a fixed catalog
// - delivery:  turns status commands into delivery-status events
//
// ============================================================================

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod domain;
pub mod health;
pub mod inventory;
pub mod messaging;
pub mod metrics;
pub mod services;
pub mod utils;
