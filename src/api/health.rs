use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::health::HealthMonitor;

/// GET /health. 503 only when a component is unhealthy.
pub async fn health(monitor: web::Data<Arc<HealthMonitor>>) -> HttpResponse {
    let snapshot = monitor.snapshot().await;

    if snapshot.status == "unhealthy" {
        HttpResponse::ServiceUnavailable().json(snapshot)
    } else {
        HttpResponse::Ok().json(snapshot)
    }
}
