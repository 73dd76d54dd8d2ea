use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::Address;
use crate::http::extract::{ApiPath, AuthUser, ValidJson};
use crate::http::response::{success, ApiResult};
use crate::http::AppState;
use crate::services::{OrderItemRequest, PlaceOrder};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 100))]
    pub items: Vec<OrderItemRequest>,
    #[validate]
    pub shipping_address: Address,
    pub coupon_code: Option<String>,
}

pub async fn create_order(
    State(s): State<AppState>,
    user: AuthUser,
    ValidJson(r): ValidJson<CreateOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    let order = s.orders.place_order(PlaceOrder {
        user_id: user.user_id.clone(),
        items: r.items,
        shipping_address: r.shipping_address,
        coupon_code: r.coupon_code.filter(|c| !c.trim().is_empty()),
    }).await?;

    if let Err(e) = s.carts.clear(&user.user_id).await {
        tracing::warn!(user_id = %user.user_id, order_id = %order.id(), error = %e, "cart not cleared after checkout");
    }
    Ok((StatusCode::CREATED, success(order)))
}

pub async fn list_orders(State(s): State<AppState>, user: AuthUser) -> ApiResult<impl IntoResponse> {
    Ok(success(s.order_service.list_orders(&user.user_id).await?))
}

pub async fn get_order(
    State(s): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(s.order_service.get_order(&user.viewer(), id).await?))
}

pub async fn pay_order(
    State(s): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(s.order_service.pay_order(&user.viewer(), id).await?))
}
