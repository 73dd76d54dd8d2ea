//! REST surface.

pub mod admin;
pub mod cart;
pub mod coupons;
pub mod extract;
pub mod orders;
pub mod response;

use axum::routing::{delete, get, post, put};
use axum::{middleware, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::config::AppConfig;
use crate::messaging::EventPublisher;
use crate::services::{CartStore, CouponEngine, OrderProcessor, OrderService, PaymentGateway, RetryPolicy};
use crate::storage::Store;

#[derive(Clone)]
pub struct AppState {
    pub carts: Arc<CartStore>,
    pub coupons: Arc<CouponEngine>,
    pub orders: Arc<OrderProcessor>,
    pub order_service: Arc<OrderService>,
    /// Put internal error messages into response bodies.
    pub expose_internal_errors: bool,
}

impl AppState {
    /// Wires every service onto one store.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn Store>,
        publisher: Arc<dyn EventPublisher>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let timeout = config.store_timeout;
        let retry = RetryPolicy::new(config.order_max_attempts, config.retry_base_delay);
        let coupons = Arc::new(CouponEngine::new(store.clone(), timeout, retry.clone()));
        Self {
            carts: Arc::new(CartStore::new(store.clone(), timeout)),
            orders: Arc::new(OrderProcessor::new(store.clone(), coupons.clone(), publisher.clone(), timeout, retry.clone())),
            order_service: Arc::new(OrderService::new(store, gateway, publisher, timeout, retry)),
            coupons,
            expose_internal_errors: config.is_development(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/cart", get(cart::get_cart).post(cart::add_item).delete(cart::clear_cart))
        .route("/cart/:item_id", put(cart::update_item).delete(cart::remove_item))
        .route("/coupons/validate", post(coupons::validate_coupon))
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/pay", post(orders::pay_order))
        .route("/admin/orders/:id/status", put(admin::update_order_status))
        .route("/admin/orders/:id", delete(admin::purge_order));

    let expose = state.expose_internal_errors;
    let app = Router::new()
        .route("/health", get(|| async { response::success(json!({"healthy": true, "service": "opensase-checkout"})) }))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);
    if expose { app.layer(middleware::map_response(response::expose_internal_detail)) } else { app }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Coupon, Product};
    use crate::domain::value_objects::{CouponCode, Money};
    use crate::messaging::MemoryPublisher;
    use crate::services::MockGateway;
    use crate::storage::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Arc<MemoryStore>, Router) {
        let store = Arc::new(MemoryStore::new());
        store.upsert_product(Product::create("P", "Hoodie", Money::from_cents(6000)).unwrap().with_stock(5));
        store.upsert_coupon(Coupon::percentage(CouponCode::new("SAVE10").unwrap(), Decimal::TEN)
            .with_max_discount(Money::from_cents(2000)));
        let state = AppState::new(
            &AppConfig::default(),
            store.clone(),
            Arc::new(MemoryPublisher::default()),
            Arc::new(MockGateway::new(Duration::ZERO)),
        );
        (store, router(state))
    }

    fn request(method: &str, uri: &str, user: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri).header("content-type", "application/json");
        if let Some(user) = user { builder = builder.header("x-user-id", user); }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        builder.body(body).unwrap()
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn address() -> serde_json::Value {
        json!({"fullName": "Ada", "street": "1 Main St", "city": "Lagos", "postalCode": "100001", "country": "NG"})
    }

    fn decimal(v: &serde_json::Value) -> Decimal { Decimal::from_str(v.as_str().unwrap()).unwrap() }

    #[tokio::test]
    async fn test_health() {
        let (_, app) = app();
        let (status, body) = call(&app, request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
    }

    #[tokio::test]
    async fn test_missing_identity_is_401() {
        let (_, app) = app();
        let (status, body) = call(&app, request("GET", "/api/v1/cart", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "error");
        assert_eq!(body["kind"], "unauthenticated");
    }

    #[tokio::test]
    async fn test_cart_flow() {
        let (_, app) = app();
        let add = json!({"productId": "P", "quantity": 2, "size": "M"});
        let (status, _) = call(&app, request("POST", "/api/v1/cart", Some("U1"), Some(add.clone()))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, request("POST", "/api/v1/cart", Some("U1"), Some(add))).await;
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"]["totalQuantity"], 4);
        assert_eq!(decimal(&body["data"]["totalAmount"]), Decimal::from(240));

        let item_id = body["data"]["items"][0]["id"].as_str().unwrap().to_string();
        let (status, body) = call(&app, request("PUT", &format!("/api/v1/cart/{item_id}"), Some("U1"), Some(json!({"quantity": -1})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_argument");

        let (_, body) = call(&app, request("DELETE", "/api/v1/cart", Some("U1"), None)).await;
        assert!(body["data"]["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_amounts_above_column_range_are_rejected() {
        let (_, app) = app();
        let add = json!({"productId": "P", "quantity": 2, "price": 10_000_000_000u64});
        let (status, body) = call(&app, request("POST", "/api/v1/cart", Some("U1"), Some(add))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_argument");

        let quote = json!({"code": "SAVE10", "orderAmount": "79228162514264337593543950335"});
        let (status, _) = call(&app, request("POST", "/api/v1/coupons/validate", Some("U1"), Some(quote))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, cart) = call(&app, request("GET", "/api/v1/cart", Some("U1"), None)).await;
        assert!(cart["data"]["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_coupon_validation_endpoint() {
        let (_, app) = app();
        let (status, body) = call(&app, request("POST", "/api/v1/coupons/validate", Some("U1"),
            Some(json!({"code": "save10", "orderAmount": 300})))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decimal(&body["data"]["discountAmount"]), Decimal::from(20));
        assert_eq!(decimal(&body["data"]["finalAmount"]), Decimal::from(280));

        let (status, body) = call(&app, request("POST", "/api/v1/coupons/validate", Some("U1"),
            Some(json!({"code": "NOPE", "orderAmount": 300})))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_checkout_clears_cart_and_maps_stock_errors() {
        let (store, app) = app();
        call(&app, request("POST", "/api/v1/cart", Some("U1"), Some(json!({"productId": "P", "quantity": 1})))).await;

        let order = json!({"items": [{"productId": "P", "quantity": 5}], "shippingAddress": address(), "couponCode": "SAVE10"});
        let (status, body) = call(&app, request("POST", "/api/v1/orders", Some("U1"), Some(order))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "Pending");
        assert_eq!(decimal(&body["data"]["total"]), Decimal::from(280));
        assert_eq!(store.product(&"P".into()).unwrap().stock.value(), 0);

        let (_, cart) = call(&app, request("GET", "/api/v1/cart", Some("U1"), None)).await;
        assert!(cart["data"]["items"].as_array().unwrap().is_empty());

        let again = json!({"items": [{"productId": "P", "quantity": 1}], "shippingAddress": address()});
        let (status, body) = call(&app, request("POST", "/api/v1/orders", Some("U1"), Some(again))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "insufficient_stock");
    }

    #[tokio::test]
    async fn test_order_request_validation() {
        let (_, app) = app();
        let (status, body) = call(&app, request("POST", "/api/v1/orders", Some("U1"),
            Some(json!({"items": [], "shippingAddress": address()})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_argument");

        let (status, _) = call(&app, request("POST", "/api/v1/orders", Some("U1"), Some(json!({"items": "nope"})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_orders_are_private_and_admin_routes_guarded() {
        let (_, app) = app();
        let order = json!({"items": [{"productId": "P", "quantity": 1}], "shippingAddress": address()});
        let (_, body) = call(&app, request("POST", "/api/v1/orders", Some("U1"), Some(order))).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = call(&app, request("GET", &format!("/api/v1/orders/{id}"), Some("U2"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, list) = call(&app, request("GET", "/api/v1/orders", Some("U1"), None)).await;
        assert_eq!(list["data"].as_array().unwrap().len(), 1);

        let uri = format!("/api/v1/admin/orders/{id}/status");
        let (status, body) = call(&app, request("PUT", &uri, Some("U1"), Some(json!({"status": "Processing"})))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "forbidden");

        let admin = Request::builder().method("PUT").uri(&uri)
            .header("content-type", "application/json").header("x-user-id", "ops").header("x-user-role", "admin")
            .body(Body::from(json!({"status": "Processing"}).to_string())).unwrap();
        let (status, body) = call(&app, admin).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "Processing");

        let (status, body) = call(&app, request("POST", &format!("/api/v1/orders/{id}/pay"), Some("U1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["paymentStatus"], "Paid");
    }
}
