use axum::extract::State;
use axum::response::IntoResponse;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;
use crate::domain::value_objects::Money;
use crate::http::extract::{validate_amount, AuthUser, ValidJson};
use crate::http::response::{success, ApiResult};
use crate::http::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(custom = "validate_amount")]
    pub order_amount: Decimal,
}

/// Prices a coupon without redeeming it.
pub async fn validate_coupon(
    State(s): State<AppState>,
    _user: AuthUser,
    ValidJson(r): ValidJson<ValidateCouponRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(s.coupons.validate(&r.code, Money::new(r.order_amount)).await?))
}
