//! Domain events
use crate::domain::aggregates::{OrderStatus, PaymentStatus};
use crate::domain::value_objects::{CouponCode, Money, ProductId, UserId};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Coupon(CouponEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: UserId, total: Money, items: Vec<(ProductId, u32)> },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    PaymentStatusChanged { order_id: Uuid, from: PaymentStatus, to: PaymentStatus },
    Purged { order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CouponEvent {
    Redeemed { coupon_id: Uuid, code: CouponCode, order_id: Uuid },
}

impl DomainEvent {
    /// Message subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Placed { .. }) => "ecommerce.order.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "ecommerce.order.status_changed",
            Self::Order(OrderEvent::PaymentStatusChanged { .. }) => "ecommerce.order.payment_status_changed",
            Self::Order(OrderEvent::Purged { .. }) => "ecommerce.order.purged",
            Self::Coupon(CouponEvent::Redeemed { .. }) => "ecommerce.coupon.redeemed",
        }
    }
}
