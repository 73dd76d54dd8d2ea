//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{CouponCode, Money};
use crate::EcommerceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponType { Percentage, Fixed }

impl fmt::Display for CouponType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Percentage => f.write_str("percentage"), Self::Fixed => f.write_str("fixed") }
    }
}

impl FromStr for CouponType {
    type Err = EcommerceError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(EcommerceError::Internal(format!("unknown coupon type {other:?}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    pub coupon_type: CouponType,
    /// Percent for percentage coupons, an amount for fixed ones.
    pub value: Decimal,
    pub min_order_amount: Option<Money>,
    /// Cap on the discount; only honoured for percentage coupons.
    pub max_discount: Option<Money>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn percentage(code: CouponCode, percent: Decimal) -> Self { Self::create(code, CouponType::Percentage, percent) }
    pub fn fixed(code: CouponCode, amount: Money) -> Self { Self::create(code, CouponType::Fixed, amount.amount()) }

    fn create(code: CouponCode, coupon_type: CouponType, value: Decimal) -> Self {
        Self {
            id: Uuid::now_v7(), code, coupon_type, value, min_order_amount: None, max_discount: None,
            usage_limit: None, used_count: 0, expiry_date: None, is_active: true, created_at: Utc::now(),
        }
    }

    pub fn with_max_discount(mut self, cap: Money) -> Self { self.max_discount = Some(cap); self }
    pub fn with_min_order_amount(mut self, min: Money) -> Self { self.min_order_amount = Some(min); self }
    pub fn with_usage_limit(mut self, limit: u32) -> Self { self.usage_limit = Some(limit); self }
    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self { self.expiry_date = Some(at); self }

    pub fn is_exhausted(&self) -> bool { self.usage_limit.is_some_and(|limit| self.used_count >= limit) }

    /// Checks redeemability at `now` and computes the discount for `order_amount`.
    ///
    /// The result always lies in `0..=order_amount`.
    pub fn discount_for(&self, order_amount: Money, now: DateTime<Utc>) -> Result<Money, CouponError> {
        if !self.is_active { return Err(CouponError::Inactive); }
        if self.expiry_date.is_some_and(|expiry| expiry < now) { return Err(CouponError::Expired); }
        if self.is_exhausted() { return Err(CouponError::LimitExceeded); }
        if let Some(min) = self.min_order_amount {
            if order_amount < min { return Err(CouponError::BelowMinimum { minimum: min, amount: order_amount }); }
        }
        let discount = match self.coupon_type {
            CouponType::Percentage => {
                let raw = order_amount.amount().checked_mul(self.value).ok_or(CouponError::AmountOutOfRange)?;
                let raw = Money::new(raw / Decimal::ONE_HUNDRED).rounded();
                match self.max_discount { Some(cap) => raw.min(cap), None => raw }
            }
            CouponType::Fixed => Money::new(self.value),
        };
        Ok(discount.min(order_amount).max(Money::ZERO))
    }

    /// Applies one redemption if `used_count` still equals `expected_used_count`.
    pub fn redeem(&mut self, expected_used_count: u32) -> Result<(), CouponError> {
        if self.used_count != expected_used_count { return Err(CouponError::StaleUsage); }
        if self.is_exhausted() { return Err(CouponError::LimitExceeded); }
        self.used_count += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("coupon is not active")]
    Inactive,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    LimitExceeded,
    #[error("order amount {amount} is below minimum {minimum}")]
    BelowMinimum { minimum: Money, amount: Money },
    #[error("coupon usage changed concurrently")]
    StaleUsage,
    #[error("order amount is out of range")]
    AmountOutOfRange,
}

impl CouponError {
    pub fn into_ecommerce(self, code: &CouponCode) -> EcommerceError {
        match self {
            Self::Inactive => EcommerceError::InvalidState(format!("coupon {code} is not active")),
            Self::Expired => EcommerceError::Expired(code.to_string()),
            Self::LimitExceeded => EcommerceError::LimitExceeded(code.to_string()),
            Self::BelowMinimum { minimum, amount } => EcommerceError::BelowMinimum {
                minimum: minimum.amount(), amount: amount.amount(),
            },
            Self::StaleUsage => EcommerceError::Conflict(format!("coupon {code} usage changed concurrently")),
            Self::AmountOutOfRange => EcommerceError::InvalidArgument(format!("order amount is out of range for coupon {code}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn save10() -> Coupon {
        Coupon::percentage(CouponCode::new("save10").unwrap(), Decimal::TEN).with_max_discount(Money::from_cents(2000))
    }

    #[test]
    fn test_percentage_capped_by_max_discount() {
        let now = Utc::now();
        assert_eq!(save10().discount_for(Money::from_cents(30000), now), Ok(Money::from_cents(2000)));
        assert_eq!(save10().discount_for(Money::from_cents(15000), now), Ok(Money::from_cents(1500)));
    }

    #[test]
    fn test_fixed_discount_clamped_to_order_amount() {
        let c = Coupon::fixed(CouponCode::new("FLAT50").unwrap(), Money::from_cents(5000));
        assert_eq!(c.discount_for(Money::from_cents(3000), Utc::now()), Ok(Money::from_cents(3000)));
        assert_eq!(c.discount_for(Money::ZERO, Utc::now()), Ok(Money::ZERO));
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        let c = Coupon::percentage(CouponCode::new("P15").unwrap(), Decimal::new(15, 0));
        // 15% of 0.10 = 0.015
        assert_eq!(c.discount_for(Money::from_cents(10), Utc::now()), Ok(Money::from_cents(2)));
    }

    #[test]
    fn test_huge_order_amount_is_out_of_range() {
        let amount = Money::new(Decimal::MAX);
        assert_eq!(save10().discount_for(amount, Utc::now()), Err(CouponError::AmountOutOfRange));
    }

    #[test]
    fn test_rejections_in_order() {
        let now = Utc::now();
        let mut c = save10().with_usage_limit(1).expiring_at(now - Duration::days(1));
        c.is_active = false;
        assert_eq!(c.discount_for(Money::from_cents(100), now), Err(CouponError::Inactive));
        c.is_active = true;
        assert_eq!(c.discount_for(Money::from_cents(100), now), Err(CouponError::Expired));
        c.expiry_date = Some(now + Duration::days(1));
        c.used_count = 1;
        assert_eq!(c.discount_for(Money::from_cents(100), now), Err(CouponError::LimitExceeded));
        c.used_count = 0;
        let c = c.with_min_order_amount(Money::from_cents(5000));
        assert!(matches!(c.discount_for(Money::from_cents(100), now), Err(CouponError::BelowMinimum { .. })));
    }

    #[test]
    fn test_redeem_is_compare_and_swap() {
        let mut c = save10().with_usage_limit(1);
        assert_eq!(c.redeem(1), Err(CouponError::StaleUsage));
        c.redeem(0).unwrap();
        assert_eq!(c.used_count, 1);
        assert_eq!(c.redeem(1), Err(CouponError::LimitExceeded));
    }
}
