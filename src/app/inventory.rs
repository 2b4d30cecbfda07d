use actix_web::{web, HttpServer};
use std::sync::Arc;

use crate::api::inventory::InventoryState;
use crate::config::Config;
use crate::domain::inventory::ProductCatalog;
use crate::health::HealthMonitor;
use crate::metrics::Metrics;

/// Inventory service: the availability oracle. No broker, no database.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let catalog = ProductCatalog::default();
    tracing::info!(
        service = %config.service,
        port = config.port,
        environment = config.environment.as_str(),
        product_count = catalog.all().len(),
        "Starting inventory service"
    );

    let metrics = web::Data::new(Arc::new(Metrics::new()?));
    let monitor = web::Data::new(Arc::new(HealthMonitor::new(config.service.name())));
    let state = web::Data::new(InventoryState::new(catalog, config.auth_token.clone()));

    let server = HttpServer::new(move || {
        crate::service_app!(crate::api::inventory::routes)
            .app_data(state.clone())
            .app_data(monitor.clone())
            .app_data(metrics.clone())
    })
    .disable_signals()
    .bind(("0.0.0.0", config.port))?
    .run();

    tracing::info!(port = config.port, "Inventory service listening");
    let served = super::serve_until_shutdown(server).await;

    tracing::info!("Inventory service stopped");
    served
}
