//! Request extractors.
//!
//! Identity is established upstream; this service only reads the opaque user
//! id and role the gateway forwards.

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::Json;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};
use crate::domain::value_objects::{Money, UserId};
use crate::http::response::ApiError;
use crate::services::Viewer;
use crate::EcommerceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl AuthUser {
    pub fn viewer(&self) -> Viewer {
        Viewer { user_id: self.user_id.clone(), is_admin: self.is_admin }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts.headers.get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                tracing::debug!("missing {USER_ID_HEADER} header");
                ApiError(EcommerceError::Unauthenticated)
            })?;
        let is_admin = parts.headers.get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));
        Ok(Self { user_id: UserId::new(user_id), is_admin })
    }
}

/// An authenticated caller carrying the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::warn!(user_id = %user.user_id, "admin route refused");
            return Err(ApiError(EcommerceError::Forbidden("admin role required".into())));
        }
        Ok(Self(user))
    }
}

/// Path parameters with enveloped rejections.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// JSON body that must also pass `validator` rules.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate().map_err(EcommerceError::from)?;
        Ok(Self(value))
    }
}

fn within(value: &Decimal, max: Money, code: &'static str) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("negative_amount"));
    }
    if *value > max.amount() {
        return Err(ValidationError::new(code));
    }
    Ok(())
}

/// `custom` rule for unit prices.
pub fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    within(price, Money::MAX_PRICE, "price_too_large")
}

/// `custom` rule for cart and order amounts.
pub fn validate_amount(amount: &Decimal) -> Result<(), ValidationError> {
    within(amount, Money::MAX_TOTAL, "amount_too_large")
}
