//! OpenSASE Checkout
//!
//! Cart, coupon and order-placement service for the OpenSASE e-commerce
//! platform.
//!
//! ## Features
//! - Per-user shopping carts with line merging and live product views
//! - Percentage and fixed coupons with usage limits
//! - All-or-nothing order placement that never overdraws stock
//! - Order status administration and payment capture
//!
//! The storage engine is injected through the [`storage::Store`] trait; the
//! crate ships an in-memory store and a Postgres store.

pub mod config;
pub mod domain;
pub mod http;
pub mod messaging;
pub mod services;
pub mod storage;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

pub use domain::aggregates::{Cart, CartItem, Coupon, CouponType, Order, OrderStatus, PaymentStatus, Product};
pub use domain::value_objects::{CouponCode, Money, ProductId, Quantity, UserId};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EcommerceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: ProductId, requested: u32, available: u32 },

    #[error("Coupon {0} has expired")]
    Expired(String),

    #[error("Coupon {0} has reached its usage limit")]
    LimitExceeded(String),

    #[error("Order amount {amount} is below the coupon minimum of {minimum}")]
    BelowMinimum { minimum: Decimal, amount: Decimal },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, machine-readable error kind carried on every error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    InsufficientStock,
    Expired,
    LimitExceeded,
    BelowMinimum,
    InvalidState,
    Conflict,
    Unavailable,
    Unauthenticated,
    Forbidden,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::InsufficientStock => "insufficient_stock",
            Self::Expired => "expired",
            Self::LimitExceeded => "limit_exceeded",
            Self::BelowMinimum => "below_minimum",
            Self::InvalidState => "invalid_state",
            Self::Conflict => "conflict",
            Self::Unavailable => "unavailable",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::Internal => "internal",
        }
    }
}

impl EcommerceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::Expired(_) => ErrorKind::Expired,
            Self::LimitExceeded(_) => ErrorKind::LimitExceeded,
            Self::BelowMinimum { .. } => ErrorKind::BelowMinimum,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Only contention and storage outages are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Unavailable(_))
    }

    pub fn not_found(what: impl std::fmt::Display, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} {id}"))
    }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidArgument(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_contention_is_retryable() {
        assert!(EcommerceError::Conflict("stock".into()).is_retryable());
        assert!(EcommerceError::Unavailable("timeout".into()).is_retryable());
        assert!(!EcommerceError::LimitExceeded("SAVE10".into()).is_retryable());
        assert!(!EcommerceError::InsufficientStock { product_id: "P1".into(), requested: 2, available: 1 }.is_retryable());
    }

    #[test]
    fn test_error_kind_strings() {
        assert_eq!(EcommerceError::not_found("product", "P1").kind().as_str(), "not_found");
        assert_eq!(EcommerceError::not_found("product", "P1").to_string(), "product P1 not found");
        assert_eq!(ErrorKind::BelowMinimum.as_str(), "below_minimum");
    }
}
