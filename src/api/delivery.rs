use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::{DeliveryStatusUpdateEvent, OrderStatus};
use crate::services::DeliveryService;

use super::{ApiError, ApiResponse};

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/delivery/{order_id}/status", web::post().to(update_delivery_status));
}

#[derive(Debug, Default, Deserialize)]
struct StatusCommand {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct PublishedStatus {
    order_id: Uuid,
    status: OrderStatus,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<DeliveryStatusUpdateEvent> for PublishedStatus {
    fn from(event: DeliveryStatusUpdateEvent) -> Self {
        Self {
            order_id: event.order_id,
            status: event.status,
            updated_at: event.updated_at,
        }
    }
}

/// POST /api/delivery/{orderId}/status
async fn update_delivery_status(
    service: web::Data<Arc<DeliveryService>>,
    path: web::Path<String>,
    body: web::Json<StatusCommand>,
) -> Result<HttpResponse, ApiError> {
    let status = body
        .into_inner()
        .status
        .and_then(|s| s.parse::<OrderStatus>().ok())
        .filter(OrderStatus::is_delivery_status)
        .ok_or_else(|| ApiError::BadRequest(r#"Invalid status. Must be "Shipped" or "Delivered""#.to_string()))?;

    let raw = path.into_inner();
    let order_id = Uuid::parse_str(&raw).map_err(|_| ApiError::BadRequest("Invalid order id".to_string()))?;

    let event = service.publish_status_update(order_id, status).await.map_err(|e| {
        tracing::error!(order_id = %order_id, error = %e, "Failed to publish delivery status update");
        ApiError::Internal("Failed to publish delivery status update".to_string())
    })?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        format!("Delivery status update published for order {order_id}"),
        PublishedStatus::from(event),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{BrokerClient, InMemoryTransport, LineNames};
    use crate::metrics::Metrics;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    async fn service(transport: &InMemoryTransport, connect: bool) -> Arc<DeliveryService> {
        let broker = Arc::new(BrokerClient::new(
            Arc::new(transport.clone()),
            LineNames::default(),
            Arc::new(Metrics::new().unwrap()),
        ));
        if connect {
            broker.connect().await.unwrap();
        }
        Arc::new(DeliveryService::new(broker))
    }

    #[actix_web::test]
    async fn test_status_update_is_published() {
        let transport = InMemoryTransport::default();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service(&transport, true).await))
                .configure(routes),
        )
        .await;
        let order_id = Uuid::new_v4();

        let body: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/delivery/{order_id}/status"))
                .set_json(json!({"status": "Shipped"}))
                .to_request(),
        )
        .await;

        assert_eq!(body["success"], true);
        assert_eq!(body["message"], format!("Delivery status update published for order {order_id}"));
        assert_eq!(body["data"]["order_id"], order_id.to_string());
        assert_eq!(body["data"]["status"], "Shipped");
        assert_eq!(transport.backlog("delivery.updates").await, 1);
    }

    #[actix_web::test]
    async fn test_invalid_status_is_rejected() {
        let transport = InMemoryTransport::default();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service(&transport, true).await))
                .configure(routes),
        )
        .await;

        for body in [json!({"status": "Pending Shipment"}), json!({"status": "Lost"}), json!({})] {
            let response = test::call_service(
                &app,
                test::TestRequest::post()
                    .uri(&format!("/api/delivery/{}/status", Uuid::new_v4()))
                    .set_json(body)
                    .to_request(),
            )
            .await;
            assert_eq!(response.status(), 400);
            let body: Value = test::read_body_json(response).await;
            assert_eq!(body["error"], r#"Invalid status. Must be "Shipped" or "Delivered""#);
        }
        assert_eq!(transport.stats().await.sent, 0);
    }

    #[actix_web::test]
    async fn test_publish_failure_is_500() {
        let transport = InMemoryTransport::default();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service(&transport, true).await))
                .configure(routes),
        )
        .await;
        transport.set_fail_sends(true);

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/delivery/{}/status", Uuid::new_v4()))
                .set_json(json!({"status": "Delivered"}))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), 500);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["error"], "Failed to publish delivery status update");
    }

    #[actix_web::test]
    async fn test_disconnected_broker_still_answers_success() {
        let transport = InMemoryTransport::default();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service(&transport, false).await))
                .configure(routes),
        )
        .await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/delivery/{}/status", Uuid::new_v4()))
                .set_json(json!({"status": "Delivered"}))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), 200);
        assert_eq!(transport.stats().await.sent, 0);
    }
}
