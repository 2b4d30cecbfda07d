use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::Value;

use crate::domain::inventory::{AvailabilityCheckItem, ProductCatalog};

use super::{ApiError, ApiResponse};

// ============================================================================
// Inventory API - the availability oracle
// ============================================================================
//
// Every route requires the shared secret in the `token` header:
// missing -> 401, wrong -> 403.
//
// ============================================================================

pub const TOKEN_HEADER: &str = "token";

pub struct InventoryState {
    pub catalog: ProductCatalog,
    pub token: String,
}

impl InventoryState {
    pub fn new(catalog: ProductCatalog, token: impl Into<String>) -> Self {
        Self {
            catalog,
            token: token.into(),
        }
    }

    fn authenticate(&self, req: &HttpRequest) -> Result<(), ApiError> {
        let Some(provided) = req.headers().get(TOKEN_HEADER) else {
            tracing::warn!(path = %req.path(), "Authentication failed: no token provided");
            return Err(ApiError::Unauthorized(
                "Authentication required. Please provide a token in the headers.".to_string(),
            ));
        };

        if provided.as_bytes() != self.token.as_bytes() {
            tracing::warn!(path = %req.path(), "Authentication failed: invalid token");
            return Err(ApiError::Forbidden("Invalid authentication token".to_string()));
        }

        tracing::debug!(path = %req.path(), "Authentication successful");
        Ok(())
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/inventory")
            .route("/check", web::post().to(check_availability))
            .route("/products", web::get().to(list_products))
            .route("/products/{product_id}", web::get().to(get_product)),
    );
}

/// Structural checks on the raw body, in the order they are reported
fn parse_check_items(body: &Value) -> Result<Vec<AvailabilityCheckItem>, ApiError> {
    let items = match body.get("items").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => items,
        _ => {
            return Err(ApiError::BadRequest(
                "items array is required and must not be empty".to_string(),
            ))
        }
    };

    items
        .iter()
        .map(|item| {
            let product_id = item
                .get("product_id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| ApiError::BadRequest("Each item must have a valid product_id".to_string()))?;

            let quantity = item
                .get("quantity")
                .and_then(Value::as_u64)
                .and_then(|q| u32::try_from(q).ok())
                .filter(|q| *q > 0)
                .ok_or_else(|| {
                    ApiError::BadRequest("Each item must have a positive integer quantity".to_string())
                })?;

            Ok(AvailabilityCheckItem {
                product_id: product_id.to_string(),
                quantity,
            })
        })
        .collect()
}

/// POST /api/inventory/check
async fn check_availability(
    req: HttpRequest,
    state: web::Data<InventoryState>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    state.authenticate(&req)?;
    let items = parse_check_items(&body)?;

    let result = state.catalog.check_availability(&items);
    Ok(HttpResponse::Ok().json(ApiResponse::ok(result)))
}

/// GET /api/inventory/products
async fn list_products(req: HttpRequest, state: web::Data<InventoryState>) -> Result<HttpResponse, ApiError> {
    state.authenticate(&req)?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(state.catalog.all())))
}

/// GET /api/inventory/products/{productId}
async fn get_product(
    req: HttpRequest,
    state: web::Data<InventoryState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    state.authenticate(&req)?;

    let product_id = path.into_inner();
    match state.catalog.get(&product_id) {
        Some(product) => Ok(HttpResponse::Ok().json(ApiResponse::ok(product))),
        None => Err(ApiError::not_found("Product not found")),
    }
}
