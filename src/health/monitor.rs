use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::probes::HealthProbe;
use super::{overall_status, ComponentHealth, ComponentReport, HealthStatus, SystemHealth};

// ============================================================================
// Health Monitor
// ============================================================================
//
// Keeps the last known status of every component. Probes run on a fixed
// interval in a background task; components may also be updated directly.
//
// ============================================================================

pub struct HealthMonitor {
    service: &'static str,
    components: RwLock<HashMap<String, ComponentHealth>>,
    probes: Vec<Arc<dyn HealthProbe>>,
}

impl HealthMonitor {
    pub fn new(service: &'static str) -> Self {
        Self {
            service,
            components: RwLock::new(HashMap::new()),
            probes: Vec::new(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub async fn update(&self, component: &str, status: HealthStatus) {
        let mut components = self.components.write().await;

        let changed = components.get(component).map(|c| &c.status) != Some(&status);
        if changed {
            match &status {
                HealthStatus::Healthy => tracing::info!(component, "Component healthy"),
                other => tracing::warn!(component, status = other.label(), reason = other.reason(), "Component health changed"),
            }
        }

        components.insert(
            component.to_string(),
            ComponentHealth {
                status,
                last_check: Utc::now(),
            },
        );
    }

    pub async fn run_probes(&self) {
        for probe in &self.probes {
            let status = probe.probe().await;
            self.update(probe.component(), status).await;
        }
    }

    /// Probe once immediately, then every `interval`
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                monitor.run_probes().await;
            }
        })
    }

    pub async fn snapshot(&self) -> SystemHealth {
        let components = self.components.read().await;
        let overall = overall_status(components.values().map(|c| &c.status));

        SystemHealth {
            status: overall.label(),
            service: self.service,
            timestamp: Utc::now(),
            components: components
                .iter()
                .map(|(name, health)| {
                    (
                        name.clone(),
                        ComponentReport {
                            status: health.status.label(),
                            details: health.status.reason().map(str::to_string),
                            last_check: health.last_check,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(&'static str, HealthStatus);

    #[async_trait]
    impl HealthProbe for Fixed {
        fn component(&self) -> &'static str {
            self.0
        }

        async fn probe(&self) -> HealthStatus {
            self.1.clone()
        }
    }

    #[tokio::test]
    async fn test_empty_monitor_is_healthy() {
        let snapshot = HealthMonitor::new("sales-service").snapshot().await;
        assert_eq!(snapshot.status, "healthy");
        assert_eq!(snapshot.service, "sales-service");
        assert!(snapshot.components.is_empty());
    }

    #[tokio::test]
    async fn test_probes_feed_the_snapshot() {
        let monitor = HealthMonitor::new("sales-service")
            .with_probe(Arc::new(Fixed("broker", HealthStatus::Degraded("half-open".into()))))
            .with_probe(Arc::new(Fixed("database", HealthStatus::Healthy)));

        monitor.run_probes().await;
        let snapshot = monitor.snapshot().await;

        assert_eq!(snapshot.status, "degraded");
        assert_eq!(snapshot.components["broker"].details.as_deref(), Some("half-open"));
        assert_eq!(snapshot.components["database"].status, "healthy");
    }

    #[tokio::test]
    async fn test_spawned_monitor_probes_immediately() {
        let monitor = Arc::new(
            HealthMonitor::new("delivery-service")
                .with_probe(Arc::new(Fixed("broker", HealthStatus::Unhealthy("down".into())))),
        );

        let handle = monitor.spawn(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(monitor.snapshot().await.status, "unhealthy");
    }
}
