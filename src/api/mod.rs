use actix_web::error::JsonPayloadError;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;

use crate::domain::inventory::UnavailableItem;
use crate::domain::order::OrderError;
use crate::inventory::InventoryError;

pub mod delivery;
pub mod health;
pub mod inventory;
pub mod sales;

// ============================================================================
// HTTP surface shared by all three services
// ============================================================================
//
// Every response body is an envelope:
//   {"success": true,  "data": ..., "message"?: ...}
//   {"success": false, "error": "...", "unavailable_items"?: [...]}
//
// Infrastructure failures answer with a generic message; the cause is only
// logged.
//
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    unavailable_items: Option<&'a [UnavailableItem]>,
}

pub const INVENTORY_UNAVAILABLE: &str = "Inventory service is currently unavailable. Please try again later.";
pub const INVENTORY_BAD_GATEWAY: &str = "Inventory service returned an invalid response";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Some products are not available")]
    Unavailable(Vec<UnavailableItem>),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(message: &str) -> Self {
        ApiError::NotFound(message.to_string())
    }

    pub fn internal() -> Self {
        ApiError::Internal("Internal server error".to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Unavailable(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let unavailable_items = match self {
            ApiError::Unavailable(items) => Some(items.as_slice()),
            _ => None,
        };

        HttpResponse::build(self.status_code()).json(ErrorBody {
            success: false,
            error: self.to_string(),
            unavailable_items,
        })
    }
}

impl From<OrderError> for ApiError {
    fn from(error: OrderError) -> Self {
        match error {
            OrderError::Validation(message) => ApiError::BadRequest(message),
            OrderError::Unavailable { items } => ApiError::Unavailable(items),
            OrderError::NotFound(_) => ApiError::not_found("Order not found"),
            OrderError::InvalidStatus(status) => ApiError::BadRequest(format!("Invalid status: {status}")),
            OrderError::Inventory(InventoryError::Unavailable(cause)) => {
                tracing::error!(cause = %cause, "Inventory service unavailable");
                ApiError::ServiceUnavailable(INVENTORY_UNAVAILABLE.to_string())
            }
            OrderError::Inventory(e) => {
                tracing::error!(error = %e, "Inventory service call failed");
                ApiError::BadGateway(INVENTORY_BAD_GATEWAY.to_string())
            }
            OrderError::Store(e) => {
                tracing::error!(error = %e, "Order store failure");
                ApiError::internal()
            }
        }
    }
}

/// Malformed or undecodable JSON bodies become a 400 envelope
pub fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::warn!(method = %req.method(), path = %req.path(), error = %err, "Rejected request payload");

    let message = match &err {
        JsonPayloadError::Deserialize(_) => "Invalid JSON body",
        JsonPayloadError::ContentType => "Content-Type must be application/json",
        _ => "Invalid request payload",
    };
    let response = ApiError::BadRequest(message.to_string()).error_response();

    actix_web::error::InternalError::from_response(err, response).into()
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(10 * 1024 * 1024)
        .error_handler(json_error_handler)
}

pub async fn route_not_found() -> HttpResponse {
    ApiError::not_found("Route not found").error_response()
}

/// Routes every service exposes: /health and /metrics
pub fn common_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health))
        .route("/metrics", web::get().to(crate::metrics::metrics_handler));
}

/// Build the actix `App` for one service. Each service module supplies its
/// own routes and app data through `configure`.
#[macro_export]
macro_rules! service_app {
    ($configure:expr) => {
        actix_web::App::new()
            .wrap_fn(|req, srv| {
                use actix_web::dev::Service;
                tracing::info!(method = %req.method(), path = %req.path(), "Incoming request");
                srv.call(req)
            })
            .app_data($crate::api::json_config())
            .configure($configure)
            .configure($crate::api::common_routes)
            .default_service(actix_web::web::to($crate::api::route_not_found))
    };
}
