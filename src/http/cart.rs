use axum::extract::State;
use axum::response::IntoResponse;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;
use crate::domain::value_objects::{Money, ProductId};
use crate::http::extract::{validate_price, ApiPath, AuthUser, ValidJson};
use crate::http::response::{success, ApiResult};
use crate::http::AppState;
use crate::services::AddItem;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    #[validate(length(min = 1, max = 100))]
    pub product_id: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
    #[validate(length(max = 50))]
    pub size: Option<String>,
    #[validate(length(max = 50))]
    pub color: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 0))]
    pub quantity: i64,
}

pub async fn get_cart(State(s): State<AppState>, user: AuthUser) -> ApiResult<impl IntoResponse> {
    Ok(success(s.carts.get_cart(&user.user_id).await?))
}

pub async fn add_item(
    State(s): State<AppState>,
    user: AuthUser,
    ValidJson(r): ValidJson<AddToCartRequest>,
) -> ApiResult<impl IntoResponse> {
    let item = AddItem {
        product_id: ProductId::new(r.product_id),
        size: r.size,
        color: r.color,
        quantity: r.quantity,
        price: r.price.map(Money::new),
    };
    Ok(success(s.carts.add_item(&user.user_id, item).await?))
}

pub async fn update_item(
    State(s): State<AppState>,
    user: AuthUser,
    ApiPath(item_id): ApiPath<Uuid>,
    ValidJson(r): ValidJson<UpdateQuantityRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(s.carts.update_item_quantity(&user.user_id, item_id, r.quantity).await?))
}

pub async fn remove_item(
    State(s): State<AppState>,
    user: AuthUser,
    ApiPath(item_id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(s.carts.remove_item(&user.user_id, item_id).await?))
}

pub async fn clear_cart(State(s): State<AppState>, user: AuthUser) -> ApiResult<impl IntoResponse> {
    Ok(success(s.carts.clear(&user.user_id).await?))
}
