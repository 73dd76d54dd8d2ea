use axum::extract::State;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{OrderStatus, PaymentStatus};
use crate::http::extract::{AdminUser, ApiPath, ValidJson};
use crate::http::response::{success, ApiResult};
use crate::http::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

pub async fn update_order_status(
    State(s): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(r): ValidJson<UpdateStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(admin = %admin.user_id, order_id = %id, status = ?r.status, payment_status = ?r.payment_status, "order status update");
    Ok(success(s.order_service.update_status(id, r.status, r.payment_status).await?))
}

pub async fn purge_order(
    State(s): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(admin = %admin.user_id, order_id = %id, "order purge requested");
    s.order_service.purge_order(id).await?;
    Ok(success(json!({ "orderId": id, "purged": true })))
}
