use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{BrokerConfig, Config, TransportKind};
use crate::health::{BrokerProbe, HealthMonitor};
use crate::messaging::{BrokerClient, InMemoryTransport, LineNames, RedpandaTransport, Transport};
use crate::metrics::Metrics;
use crate::utils::BackoffPolicy;

pub mod delivery;
pub mod inventory;
pub mod sales;

// ============================================================================
// Service bootstrap shared by sales, inventory and delivery
// ============================================================================

pub const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Structured logging, overridable with RUST_LOG
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,order_fulfillment=debug")))
        .init();
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

pub fn build_transport(config: &BrokerConfig) -> Arc<dyn Transport> {
    match config.transport {
        TransportKind::Redpanda => Arc::new(RedpandaTransport::from_config(config)),
        TransportKind::Memory => Arc::new(InMemoryTransport::new(config.dedup_capacity, config.dedup_ttl)),
    }
}

/// Broker client for a service, connected when possible. A failed connect is
/// fatal in production and a warning otherwise; publishes are then skipped.
pub async fn connect_broker(config: &Config, metrics: Arc<Metrics>) -> anyhow::Result<Arc<BrokerClient>> {
    let broker = Arc::new(BrokerClient::new(
        build_transport(&config.broker),
        LineNames::from_config(&config.broker),
        metrics,
    ));

    let policy = BackoffPolicy::with_attempts(config.broker.connect_attempts);
    if let Err(e) = broker.connect_with_retry(&policy).await {
        if config.environment.is_production() {
            return Err(anyhow::anyhow!("message broker connection failed: {e}"));
        }
        tracing::warn!(error = %e, "Message broker unavailable, continuing without it");
    }

    Ok(broker)
}

/// Monitor with the broker probe registered, already ticking
pub fn start_health_monitor(monitor: HealthMonitor, broker: &Arc<BrokerClient>) -> (Arc<HealthMonitor>, JoinHandle<()>) {
    let monitor = Arc::new(monitor.with_probe(Arc::new(BrokerProbe::new(broker.clone()))));
    let handle = monitor.spawn(HEALTH_PROBE_INTERVAL);
    (monitor, handle)
}

/// Stop the HTTP server on the shutdown signal, then wait for it to drain
pub async fn serve_until_shutdown(server: actix_web::dev::Server) -> anyhow::Result<()> {
    let handle = server.handle();
    let mut server = actix_web::rt::spawn(server);

    tokio::select! {
        result = &mut server => {
            result??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    handle.stop(true).await;
    server.await??;
    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Abort background loops and release the broker connection
pub async fn shutdown_background(tasks: Vec<JoinHandle<()>>, broker: &BrokerClient) {
    for task in tasks {
        task.abort();
    }
    broker.close().await;
}
