//! HTTP routes.
//!
//! Each handler authenticates the caller, hands the body to one tally-db
//! service call and wraps the result in the response envelope. No rules
//! live here.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tally_core::purchase::NewPurchaseOrder;
use tally_core::refund::RefundRequest;
use tally_core::sale::NewSale;
use tally_core::NewQcRecord;
use tower_http::trace::TraceLayer;

use crate::auth::Caller;
use crate::error::{ApiError, ApiResponse};
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Body of the return and deactivate calls.
#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/purchase-orders", post(create_purchase_order))
        .route("/purchase-orders/:id", get(get_purchase_order))
        .route("/purchase-orders/:id/submit", post(submit_purchase_order))
        .route("/purchase-orders/:id/confirm", post(confirm_purchase_order))
        .route("/purchase-orders/:id/cancel", post(cancel_purchase_order))
        .route("/purchase-orders/:id/qc-summary", post(qc_summary))
        .route("/purchase-orders/:id/return", post(return_purchase_order))
        .route("/purchase-orders/:id/items/:item/return", post(return_purchase_item))
        .route("/qc", post(adjudicate_qc))
        .route("/qc/:id", delete(delete_qc_record))
        .route("/qc/batch/:batch_id", get(list_qc_records))
        .route("/lots/:id/deactivate", post(deactivate_lot))
        .route("/sales", post(record_sale))
        .route("/refunds", post(refund_sale))
        .route("/stock/:product/:warehouse", get(get_stock))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    if state.db.health_check().await {
        (StatusCode::OK, ApiResponse::ok("Healthy", json!({"database": "up"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            ApiResponse::ok("Database unavailable", json!({"database": "down"})),
        )
    }
}

// =============================================================================
// Purchase Orders
// =============================================================================

async fn create_purchase_order(
    State(state): State<AppState>,
    Caller(principal): Caller,
    body: Result<Json<NewPurchaseOrder>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = body?;
    let detail = state.db.purchase_orders().create(&principal, input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok("Purchase order created", detail)))
}

async fn get_purchase_order(
    State(state): State<AppState>,
    Caller(_): Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let detail = state.db.purchase_orders().get(&id).await?;
    Ok(ApiResponse::ok("Purchase order", detail))
}

async fn submit_purchase_order(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let order = state.db.purchase_orders().submit(&principal, &id).await?;
    Ok(ApiResponse::ok("Purchase order submitted", order))
}

async fn confirm_purchase_order(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let detail = state.db.purchase_orders().confirm(&principal, &id).await?;
    Ok(ApiResponse::ok("Purchase order received", detail))
}

async fn cancel_purchase_order(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let order = state.db.purchase_orders().cancel(&principal, &id).await?;
    Ok(ApiResponse::ok("Purchase order cancelled", order))
}

async fn return_purchase_order(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    body: Result<Json<ReasonRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let detail = state
        .db
        .purchase_orders()
        .return_order(&principal, &id, &request.reason)
        .await?;
    Ok(ApiResponse::ok("Purchase order returned to supplier", detail))
}

async fn return_purchase_item(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((id, item)): Path<(String, String)>,
    body: Result<Json<ReasonRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let detail = state
        .db
        .purchase_orders()
        .return_item(&principal, &id, &item, &request.reason)
        .await?;
    Ok(ApiResponse::ok("Purchase order line returned to supplier", detail))
}

// =============================================================================
// Quality Control
// =============================================================================

async fn adjudicate_qc(
    State(state): State<AppState>,
    Caller(principal): Caller,
    body: Result<Json<NewQcRecord>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = body?;
    let outcome = state.db.qc().adjudicate(&principal, input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok("QC record saved", outcome)))
}

async fn qc_summary(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let order = state.db.qc().summarize(&principal, &id).await?;
    Ok(ApiResponse::ok("QC summary recomputed", order))
}

async fn delete_qc_record(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.db.qc().delete_record(&principal, &id).await?;
    Ok(ApiResponse::ok("QC record deleted", json!({ "id": id })))
}

async fn list_qc_records(
    State(state): State<AppState>,
    Caller(_): Caller,
    Path(batch_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let records = state.db.qc().records_for_batch(&batch_id).await?;
    Ok(ApiResponse::ok("QC records", records))
}

// =============================================================================
// Lots and Stock
// =============================================================================

async fn deactivate_lot(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    body: Result<Json<ReasonRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let lot = state.db.lots().deactivate(&principal, &id, &request.reason).await?;
    Ok(ApiResponse::ok("Lot deactivated", lot))
}

async fn get_stock(
    State(state): State<AppState>,
    Caller(_): Caller,
    Path((product, warehouse)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let stock = state.db.stock().get(&product, &warehouse).await?;
    Ok(ApiResponse::ok("Stock", stock))
}

// =============================================================================
// Sales and Refunds
// =============================================================================

async fn record_sale(
    State(state): State<AppState>,
    Caller(principal): Caller,
    body: Result<Json<NewSale>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = body?;
    let receipt = state.db.sales().record_sale(&principal, input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok("Sale recorded", receipt)))
}

async fn refund_sale(
    State(state): State<AppState>,
    Caller(principal): Caller,
    body: Result<Json<RefundRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let receipt = state.db.refunds().refund(&principal, request).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok("Refund recorded", receipt)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtIdentityProvider;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Duration;
    use serde_json::Value;
    use std::sync::Arc;
    use tally_core::{Principal, Product, Role, Warehouse};
    use tally_db::{Database, DbConfig};
    use tower::util::ServiceExt;

    struct TestApp {
        router: Router,
        identity: Arc<JwtIdentityProvider>,
        product: Product,
        warehouse: Warehouse,
        supplier_id: String,
    }

    async fn app() -> TestApp {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();
        let warehouse = catalog.add_warehouse("WH1", "Main Warehouse").await.unwrap();
        let supplier = catalog.add_supplier("ACME", "Acme Wholesale").await.unwrap();
        let product = catalog
            .add_product("PRD-00123", "A", "Product A", 100, 75, 5)
            .await
            .unwrap();

        let identity = Arc::new(JwtIdentityProvider::new("test-secret", None));
        let state = AppState {
            db,
            identity: identity.clone(),
        };
        TestApp {
            router: router(state),
            identity,
            product,
            warehouse,
            supplier_id: supplier.id,
        }
    }

    impl TestApp {
        fn token(&self, role: Role) -> String {
            self.identity
                .issue(&Principal::new("user-1", role), Duration::hours(1))
                .unwrap()
        }

        async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header("authorization", format!("Bearer {}", token));
            }
            let body = match body {
                Some(json) => {
                    request = request.header("content-type", "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };
            let response = self
                .router
                .clone()
                .oneshot(request.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, serde_json::from_slice(&bytes).unwrap())
        }

        fn order_body(&self, po_number: &str) -> Value {
            json!({
                "poNumber": po_number,
                "supplierId": self.supplier_id,
                "warehouseId": self.warehouse.id,
                "submit": true,
                "items": [
                    {"productId": self.product.id, "quantity": 10, "unitCostCents": 75}
                ]
            })
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = app.call("GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let app = app().await;
        let (status, body) = app
            .call("POST", "/purchase-orders", None, Some(app.order_body("PO-1")))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "UNAUTHENTICATED");

        let (status, _) = app
            .call("GET", "/purchase-orders/x", Some("not-a-jwt"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_purchase_order_flow() {
        let app = app().await;
        let manager = app.token(Role::Manager);

        let (status, body) = app
            .call("POST", "/purchase-orders", Some(&manager), Some(app.order_body("PO-7001")))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call("POST", &format!("/purchase-orders/{}/confirm", id), Some(&manager), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "RECEIVED");

        let (status, body) = app
            .call("POST", &format!("/purchase-orders/{}/confirm", id), Some(&manager), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");

        let (status, body) = app
            .call("POST", &format!("/purchase-orders/{}/cancel", id), Some(&manager), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(!body["message"].as_str().unwrap().is_empty());

        let uri = format!("/stock/{}/{}", app.product.id, app.warehouse.id);
        let (status, body) = app.call("GET", &uri, Some(&manager), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_quantity"], 0);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = app().await;
        let cashier = app.token(Role::Cashier);
        let manager = app.token(Role::Manager);

        let (status, body) = app
            .call("POST", "/purchase-orders", Some(&cashier), Some(app.order_body("PO-1")))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = app
            .call("GET", "/purchase-orders/does-not-exist", Some(&manager), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = app
            .call("POST", "/purchase-orders", Some(&manager), Some(json!({"poNumber": 7})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION");

        let (status, _) = app
            .call(
                "POST",
                "/lots/missing/deactivate",
                Some(&manager),
                Some(json!({"reason": "Recalled"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
