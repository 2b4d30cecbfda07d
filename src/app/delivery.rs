use actix_web::{web, HttpServer};
use std::sync::Arc;

use crate::config::Config;
use crate::health::HealthMonitor;
use crate::metrics::Metrics;
use crate::services::DeliveryService;

/// Delivery service: status command API and order-created consumer
pub async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        service = %config.service,
        port = config.port,
        environment = config.environment.as_str(),
        "Starting delivery service"
    );

    let metrics = Arc::new(Metrics::new()?);
    let broker = super::connect_broker(&config, metrics.clone()).await?;
    let (monitor, probe_task) = super::start_health_monitor(HealthMonitor::new(config.service.name()), &broker);

    let service = Arc::new(DeliveryService::new(broker.clone()));

    let mut tasks = vec![probe_task];
    match service.subscribe_order_created().await {
        Ok(Some(consumer)) => tasks.push(consumer),
        Ok(None) => tracing::warn!("Order created events not consumed, broker disconnected"),
        Err(e) => tracing::error!(error = %e, "Failed to start consuming order created events"),
    }

    let server = {
        let service = web::Data::new(service);
        let monitor = web::Data::new(monitor);
        let metrics = web::Data::new(metrics);

        HttpServer::new(move || {
            crate::service_app!(crate::api::delivery::routes)
                .app_data(service.clone())
                .app_data(monitor.clone())
                .app_data(metrics.clone())
        })
        .disable_signals()
        .bind(("0.0.0.0", config.port))?
        .run()
    };

    tracing::info!(port = config.port, "Delivery service listening");
    let served = super::serve_until_shutdown(server).await;

    super::shutdown_background(tasks, &broker).await;
    tracing::info!("Delivery service stopped");
    served
}
