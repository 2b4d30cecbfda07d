use actix_web::{web, HttpResponse};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::{CreateOrderRequest, OrderCoordinator, OrderStatus};

use super::{ApiError, ApiResponse};

// ============================================================================
// Sales API
// ============================================================================
//
// POST /api/orders            -> 201 {order_id, status, total_amount}
// GET  /api/orders/{orderId}  -> 200 full order, 404 when unknown
//
// ============================================================================

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/orders")
            .route("", web::post().to(create_order))
            .route("/{order_id}", web::get().to(get_order)),
    );
}

#[derive(Debug, Serialize)]
struct CreatedOrder {
    order_id: Uuid,
    status: OrderStatus,
    total_amount: f64,
}

async fn create_order(
    coordinator: web::Data<Arc<OrderCoordinator>>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    let order = coordinator.create_order(body.into_inner()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to create order");
        ApiError::from(e)
    })?;

    Ok(HttpResponse::Created().json(ApiResponse::ok(CreatedOrder {
        order_id: order.id,
        status: order.status,
        total_amount: order.total_amount,
    })))
}

async fn get_order(
    coordinator: web::Data<Arc<OrderCoordinator>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let raw = path.into_inner();

    // Not a valid id means no such order
    let Ok(order_id) = Uuid::parse_str(&raw) else {
        return Err(ApiError::not_found("Order not found"));
    };

    match coordinator.get_order(order_id).await {
        Ok(Some(order)) => Ok(HttpResponse::Ok().json(ApiResponse::ok(order))),
        Ok(None) => Err(ApiError::not_found("Order not found")),
        Err(e) => {
            tracing::error!(order_id = %order_id, error = %e, "Failed to get order");
            Err(ApiError::from(e))
        }
    }
}
