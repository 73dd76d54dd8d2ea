//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{CouponCode, Money, ProductId, UserId};
use crate::EcommerceError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: Uuid,
    order_number: String,
    user_id: UserId,
    items: Vec<LineItem>,
    shipping_address: Address,
    subtotal: Money,
    discount: Money,
    total: Money,
    coupon_code: Option<CouponCode>,
    status: OrderStatus,
    payment_status: PaymentStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Immutable price snapshot of one ordered product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub total: Money,
}

impl LineItem {
    pub fn new(product_id: ProductId, name: impl Into<String>, quantity: u32, unit_price: Money) -> Result<Self, OrderError> {
        let total = unit_price.checked_mul(quantity).ok_or(OrderError::AmountOverflow)?.rounded();
        Ok(Self { product_id, name: name.into(), size: None, color: None, quantity, unit_price, total })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    #[validate(length(min = 1, max = 300))]
    pub street: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 100))]
    pub country: String,
    pub phone: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Completed,
    Cancelled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Pending,
    /// A charge is in flight; held by exactly one payer.
    Authorizing,
    Paid,
    Failed,
    Refunded,
}

/// The mutable part of an order. Status writes are conditioned on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderState {
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}

impl OrderStatus {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (*self, next),
            (Pending, Processing) | (Processing, Shipped) | (Shipped, Completed)
                | (Pending | Processing | Shipped, Cancelled)
        )
    }
}

impl PaymentStatus {
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (*self, next),
            (Pending | Failed, Authorizing | Paid | Failed) | (Authorizing, Paid | Failed) | (Paid, Refunded)
        )
    }
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self { $(Self::$variant => f.write_str($text)),+ }
            }
        }

        impl FromStr for $ty {
            type Err = EcommerceError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(EcommerceError::InvalidArgument(format!("unknown {} {other:?}", stringify!($ty)))),
                }
            }
        }
    };
}

text_enum!(OrderStatus {
    Pending => "Pending", Processing => "Processing", Shipped => "Shipped", Completed => "Completed", Cancelled => "Cancelled",
});
text_enum!(PaymentStatus {
    Pending => "Pending", Authorizing => "Authorizing", Paid => "Paid", Failed => "Failed", Refunded => "Refunded",
});

/// Inputs for a new order; totals are derived, never supplied.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub shipping_address: Address,
    pub discount: Money,
    pub coupon_code: Option<CouponCode>,
}

impl Order {
    pub fn place(new: NewOrder) -> Result<Self, OrderError> {
        if new.items.is_empty() { return Err(OrderError::NoItems); }
        let id = Uuid::now_v7();
        let now = Utc::now();
        let subtotal = Money::checked_sum(new.items.iter().map(|i| i.total))
            .filter(|subtotal| *subtotal <= Money::MAX_TOTAL)
            .ok_or(OrderError::AmountOverflow)?
            .rounded();
        let discount = new.discount.min(subtotal);
        let total = subtotal.saturating_sub(discount).rounded();
        let hex = id.simple().to_string();
        let mut order = Self {
            id, order_number: format!("ORD-{}", hex[hex.len() - 12..].to_uppercase()),
            user_id: new.user_id, items: new.items, shipping_address: new.shipping_address,
            subtotal, discount, total, coupon_code: new.coupon_code,
            status: OrderStatus::Pending, payment_status: PaymentStatus::Pending,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: id, user_id: order.user_id.clone(), total,
            items: order.items.iter().map(|i| (i.product_id.clone(), i.quantity)).collect(),
        }));
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn user_id(&self) -> &UserId { &self.user_id }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn subtotal(&self) -> Money { self.subtotal }
    pub fn discount(&self) -> Money { self.discount }
    pub fn total(&self) -> Money { self.total }
    pub fn coupon_code(&self) -> Option<&CouponCode> { self.coupon_code.as_ref() }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn state(&self) -> OrderState { OrderState { status: self.status, payment_status: self.payment_status } }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::IllegalTransition { from: self.status.to_string(), to: next.to_string() });
        }
        let from = std::mem::replace(&mut self.status, next);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: next }));
        Ok(())
    }

    pub fn set_payment_status(&mut self, next: PaymentStatus) -> Result<(), OrderError> {
        if !self.payment_status.can_transition_to(next) {
            return Err(OrderError::IllegalTransition { from: self.payment_status.to_string(), to: next.to_string() });
        }
        let from = std::mem::replace(&mut self.payment_status, next);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentStatusChanged { order_id: self.id, from, to: next }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("cannot move from {from} to {to}")]
    IllegalTransition { from: String, to: String },
    #[error("order amount exceeds the maximum")]
    AmountOverflow,
}

impl From<OrderError> for EcommerceError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NoItems | OrderError::AmountOverflow => Self::InvalidArgument(e.to_string()),
            OrderError::IllegalTransition { .. } => Self::InvalidState(e.to_string()),
        }
    }
}
