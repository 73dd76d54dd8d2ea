//! Value Objects for checkout

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self { Self(s.to_string()) }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self { Self(s) }
        }
    };
}

define_id!(
    /// Opaque catalog key of a product.
    ProductId
);
define_id!(
    /// Opaque identity handed over by the auth collaborator.
    UserId
);

/// Coupon code, trimmed and upper-cased so lookups are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub const MAX_LEN: usize = 50;

    pub fn new(value: impl Into<String>) -> Result<Self, CouponCodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.len() > Self::MAX_LEN { return Err(CouponCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for CouponCode {
    type Error = CouponCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self { code.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponCodeError {
    #[error("coupon code is empty")]
    Empty,
    #[error("coupon code is longer than {} characters", CouponCode::MAX_LEN)]
    TooLong,
}

/// Money value object.
///
/// The store runs in a single currency, so only the amount is carried. All
/// rounding goes through [`Money::rounded`], which rounds half-up to cents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    /// Largest unit price a `NUMERIC(12, 2)` column holds: 9 999 999 999.99.
    pub const MAX_PRICE: Money = Money(Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2));
    /// Largest order or cart amount a `NUMERIC(14, 2)` column holds.
    pub const MAX_TOTAL: Money = Money(Decimal::from_parts(0x107A_3FFF, 0x5AF3, 0, false, 2));

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    /// Builds an amount from minor units, e.g. `from_cents(1999)` is 19.99.
    pub fn from_cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    pub fn checked_mul(self, qty: u32) -> Option<Money> { self.0.checked_mul(Decimal::from(qty)).map(Money) }
    pub fn checked_add(self, other: Money) -> Option<Money> { self.0.checked_add(other.0).map(Money) }

    /// Sum of `amounts`, or `None` if any partial sum overflows.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
        amounts.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }

    /// Difference floored at zero.
    pub fn saturating_sub(self, other: Money) -> Money {
        if other.0 >= self.0 { Money::ZERO } else { Money(self.0 - other.0) }
    }

    pub fn rounded(self) -> Money {
        Money(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self { Self(amount) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Quantity value object
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

impl Default for Quantity { fn default() -> Self { Self(0) } }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupon_code_normalized() {
        let code = CouponCode::new("  save10 ").unwrap();
        assert_eq!(code.as_str(), "SAVE10");
        assert_eq!(CouponCode::new("   "), Err(CouponCodeError::Empty));
    }

    #[test]
    fn test_money_rounds_half_up() {
        assert_eq!(Money::new(Decimal::new(10005, 3)).rounded(), Money::from_cents(1001));
        assert_eq!(Money::new(Decimal::new(10004, 3)).rounded(), Money::from_cents(1000));
    }

    #[test]
    fn test_money_saturating_sub() {
        let a = Money::from_cents(500);
        assert_eq!(a.saturating_sub(Money::from_cents(800)), Money::ZERO);
        assert_eq!(a.saturating_sub(Money::from_cents(200)), Money::from_cents(300));
    }

    #[test]
    fn test_money_arithmetic_is_checked() {
        assert_eq!(Money::MAX_PRICE, Money::from_cents(999_999_999_999));
        assert_eq!(Money::MAX_TOTAL, Money::from_cents(99_999_999_999_999));
        let huge = Money::new(Decimal::MAX);
        assert_eq!(huge.checked_mul(2), None);
        assert_eq!(huge.checked_add(Money::from_cents(1)), None);
        assert_eq!(Money::checked_sum([huge, huge]), None);
        assert_eq!(Money::from_cents(250).checked_mul(3), Some(Money::from_cents(750)));
        assert_eq!(Money::checked_sum([Money::from_cents(1), Money::from_cents(2)]), Some(Money::from_cents(3)));
    }

    #[test]
    fn test_quantity_subtract() {
        let q = Quantity::new(5);
        assert_eq!(q.subtract(5), Some(Quantity::new(0)));
        assert_eq!(q.subtract(6), None);
    }
}
