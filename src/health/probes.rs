use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::db::PostgresOrderStore;
use crate::messaging::BrokerClient;
use crate::utils::CircuitState;

use super::HealthStatus;

/// A component the monitor polls on every tick
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn component(&self) -> &'static str;

    async fn probe(&self) -> HealthStatus;
}

pub struct BrokerProbe {
    broker: Arc<BrokerClient>,
}

impl BrokerProbe {
    pub fn new(broker: Arc<BrokerClient>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl HealthProbe for BrokerProbe {
    fn component(&self) -> &'static str {
        "broker"
    }

    async fn probe(&self) -> HealthStatus {
        if !self.broker.is_connected().await {
            return HealthStatus::Degraded("not connected, events are skipped".to_string());
        }

        match self.broker.circuit_state().await {
            CircuitState::Closed => HealthStatus::Healthy,
            CircuitState::HalfOpen => HealthStatus::Degraded("publish circuit half-open".to_string()),
            CircuitState::Open => HealthStatus::Unhealthy("publish circuit open".to_string()),
        }
    }
}

pub struct DatabaseProbe {
    store: PostgresOrderStore,
}

impl DatabaseProbe {
    pub fn new(store: PostgresOrderStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthProbe for DatabaseProbe {
    fn component(&self) -> &'static str {
        "database"
    }

    async fn probe(&self) -> HealthStatus {
        match self.store.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }
}

/// Polls the inventory service's own /health endpoint
pub struct InventoryProbe {
    client: reqwest::Client,
    health_url: String,
}

impl InventoryProbe {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            health_url: format!("{base_url}/health"),
        }
    }
}

#[async_trait]
impl HealthProbe for InventoryProbe {
    fn component(&self) -> &'static str {
        "inventory_gateway"
    }

    async fn probe(&self) -> HealthStatus {
        let request = self.client.get(&self.health_url).timeout(Duration::from_secs(2)).send();

        match request.await {
            Ok(response) if response.status().is_success() => HealthStatus::Healthy,
            Ok(response) => HealthStatus::Degraded(format!("inventory service answered {}", response.status())),
            Err(e) => HealthStatus::Unhealthy(format!("inventory service unreachable: {e}")),
        }
    }
}
