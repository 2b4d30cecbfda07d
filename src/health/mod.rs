use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

mod monitor;
mod probes;

pub use monitor::HealthMonitor;
pub use probes::{BrokerProbe, DatabaseProbe, HealthProbe, InventoryProbe};

// ============================================================================
// Health - component status tracking behind GET /health
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded(_) => "degraded",
            HealthStatus::Unhealthy(_) => "unhealthy",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => Some(reason),
        }
    }

    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded(_) => 1,
            HealthStatus::Unhealthy(_) => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComponentReport {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub last_check: DateTime<Utc>,
}

/// Body of GET /health
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemHealth {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: DateTime<Utc>,
    pub components: BTreeMap<String, ComponentReport>,
}

/// The worst component wins; no components means healthy.
pub fn overall_status<'a>(statuses: impl IntoIterator<Item = &'a HealthStatus>) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut unhealthy = Vec::new();

    for status in statuses {
        if let HealthStatus::Unhealthy(reason) = status {
            unhealthy.push(reason.clone());
        }
        if status.severity() > worst.severity() {
            worst = status.clone();
        }
    }

    match worst {
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(unhealthy.join(", ")),
        other => other,
    }
}
