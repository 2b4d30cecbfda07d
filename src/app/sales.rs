use actix_web::{web, HttpServer};
use std::sync::Arc;

use crate::config::Config;
use crate::db::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use crate::domain::order::OrderCoordinator;
use crate::health::{DatabaseProbe, HealthMonitor, InventoryProbe};
use crate::inventory::HttpInventoryGateway;
use crate::metrics::Metrics;

/// Sales service: order API, inventory gateway, delivery-status consumer
pub async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        service = %config.service,
        port = config.port,
        environment = config.environment.as_str(),
        "Starting sales service"
    );

    let metrics = Arc::new(Metrics::new()?);
    let mut monitor = HealthMonitor::new(config.service.name())
        .with_probe(Arc::new(InventoryProbe::new(&config.inventory.base_url)));

    let postgres = match &config.database {
        Some(database) => match connect_database(database).await {
            Ok(store) => Some(store),
            Err(e) if config.environment.is_production() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Database unavailable, falling back to in-memory order store");
                None
            }
        },
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory order store");
            None
        }
    };

    let store: Arc<dyn OrderStore> = match &postgres {
        Some(store) => {
            monitor = monitor.with_probe(Arc::new(DatabaseProbe::new(store.clone())));
            Arc::new(store.clone())
        }
        None => Arc::new(InMemoryOrderStore::new()),
    };

    let broker = super::connect_broker(&config, metrics.clone()).await?;
    let (monitor, probe_task) = super::start_health_monitor(monitor, &broker);

    let gateway = Arc::new(HttpInventoryGateway::new(&config.inventory).with_metrics(metrics.clone()));
    let coordinator = Arc::new(OrderCoordinator::new(store, gateway, broker.clone(), metrics.clone()));

    let mut tasks = vec![probe_task];
    match coordinator.subscribe_delivery_updates().await {
        Ok(Some(consumer)) => tasks.push(consumer),
        Ok(None) => tracing::warn!("Delivery status updates not consumed, broker disconnected"),
        Err(e) => tracing::error!(error = %e, "Failed to start consuming delivery status updates"),
    }

    let server = {
        let coordinator = web::Data::new(coordinator);
        let monitor = web::Data::new(monitor);
        let metrics = web::Data::new(metrics);

        HttpServer::new(move || {
            crate::service_app!(crate::api::sales::routes)
                .app_data(coordinator.clone())
                .app_data(monitor.clone())
                .app_data(metrics.clone())
        })
        .disable_signals()
        .bind(("0.0.0.0", config.port))?
        .run()
    };

    tracing::info!(port = config.port, "Sales service listening");
    let served = super::serve_until_shutdown(server).await;

    super::shutdown_background(tasks, &broker).await;
    if let Some(store) = postgres {
        store.close().await;
    }

    tracing::info!("Sales service stopped");
    served
}

async fn connect_database(config: &crate::config::DatabaseConfig) -> anyhow::Result<PostgresOrderStore> {
    let store = PostgresOrderStore::connect(config).await?;
    store.migrate().await?;
    Ok(store)
}
