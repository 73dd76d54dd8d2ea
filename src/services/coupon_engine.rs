//! Coupon validation and redemption.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use crate::domain::aggregates::Coupon;
use crate::domain::value_objects::{CouponCode, Money};
use crate::services::retry::{with_timeout, RetryPolicy};
use crate::storage::{CouponRedemption, Store};
use crate::{EcommerceError, Result};

/// Outcome of a successful validation: the discount plus the usage count it
/// was computed against, so a later redemption can be made conditional on it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponQuote {
    pub coupon_id: Uuid,
    pub code: CouponCode,
    pub order_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    #[serde(skip)]
    pub used_count: u32,
}

impl CouponQuote {
    pub fn redemption(&self) -> CouponRedemption {
        CouponRedemption { coupon_id: self.coupon_id, expected_used_count: self.used_count }
    }
}

pub struct CouponEngine {
    store: Arc<dyn Store>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl CouponEngine {
    pub fn new(store: Arc<dyn Store>, timeout: Duration, retry: RetryPolicy) -> Self { Self { store, timeout, retry } }

    /// Looks up `code` and prices it against `order_amount`.
    #[tracing::instrument(skip(self, order_amount), fields(order_amount = %order_amount))]
    pub async fn validate(&self, code: &str, order_amount: Money) -> Result<CouponQuote> {
        let code = CouponCode::new(code).map_err(|e| EcommerceError::InvalidArgument(e.to_string()))?;
        if order_amount.is_negative() {
            return Err(EcommerceError::InvalidArgument("order amount must not be negative".into()));
        }
        let coupon = with_timeout(self.timeout, "coupon lookup", self.store.find_coupon_by_code(&code)).await?
            .ok_or_else(|| EcommerceError::not_found("coupon", &code))?;
        let discount = coupon.discount_for(order_amount, Utc::now()).map_err(|e| e.into_ecommerce(&code))?;
        tracing::debug!(code = %code, discount = %discount, "coupon validated");
        Ok(CouponQuote {
            coupon_id: coupon.id,
            code,
            order_amount,
            discount_amount: discount,
            final_amount: order_amount.saturating_sub(discount).rounded(),
            used_count: coupon.used_count,
        })
    }

    /// Adds exactly one use, re-reading and retrying when another redemption
    /// slips in between the read and the conditional write.
    #[tracing::instrument(skip(self))]
    pub async fn record_usage(&self, coupon_id: Uuid) -> Result<Coupon> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let coupon = with_timeout(self.timeout, "coupon lookup", self.store.get_coupon(coupon_id)).await?;
            if coupon.is_exhausted() {
                return Err(EcommerceError::LimitExceeded(coupon.code.to_string()));
            }
            let recorded = with_timeout(
                self.timeout, "coupon usage", self.store.record_usage(coupon_id, coupon.used_count),
            ).await;
            match recorded {
                Ok(()) => {
                    return Ok(Coupon { used_count: coupon.used_count + 1, ..coupon });
                }
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    tracing::warn!(attempt, error = %e, "coupon usage contended, retrying");
                    tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
