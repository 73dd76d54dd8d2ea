//! Order reads, admin actions and payment capture.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use crate::domain::aggregates::{Order, OrderStatus, PaymentStatus};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, UserId};
use crate::messaging::{publish_all, EventPublisher};
use crate::services::payments::{PaymentGateway, PaymentOutcome};
use crate::services::retry::{with_timeout, RetryPolicy};
use crate::storage::Store;
use crate::{EcommerceError, Result};

/// Who is asking. Non-owners who are not admins see `NotFound`, never `Forbidden`,
/// so order ids cannot be enumerated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Viewer {
    pub fn customer(user_id: UserId) -> Self { Self { user_id, is_admin: false } }
    pub fn admin(user_id: UserId) -> Self { Self { user_id, is_admin: true } }

    fn can_see(&self, order: &Order) -> bool { self.is_admin || order.user_id() == &self.user_id }
}

pub struct OrderService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    publisher: Arc<dyn EventPublisher>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        publisher: Arc<dyn EventPublisher>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self { store, gateway, publisher, timeout, retry }
    }

    pub async fn get_order(&self, viewer: &Viewer, order_id: Uuid) -> Result<Order> {
        let order = self.load(order_id).await?;
        if !viewer.can_see(&order) {
            return Err(EcommerceError::not_found("order", order_id));
        }
        Ok(order)
    }

    pub async fn list_orders(&self, user_id: &UserId) -> Result<Vec<Order>> {
        with_timeout(self.timeout, "order listing", self.store.list_orders_for_user(user_id)).await
    }

    /// Applies an admin status and/or payment-status change.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        status: Option<OrderStatus>,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Order> {
        if status.is_none() && payment_status.is_none() {
            return Err(EcommerceError::InvalidArgument("status or paymentStatus is required".into()));
        }
        if payment_status == Some(PaymentStatus::Authorizing) {
            return Err(EcommerceError::InvalidArgument("Authorizing is set by payment capture only".into()));
        }
        self.modify(order_id, |order| {
            if let Some(next) = status.filter(|s| *s != order.status()) {
                order.transition_to(next)?;
            }
            if let Some(next) = payment_status.filter(|s| *s != order.payment_status()) {
                order.set_payment_status(next)?;
            }
            Ok(())
        }).await
    }

    /// Removes an order for good. Stock and coupon usage are left as they are.
    #[tracing::instrument(skip(self))]
    pub async fn purge_order(&self, order_id: Uuid) -> Result<()> {
        with_timeout(self.timeout, "order purge", self.store.purge_order(order_id)).await?;
        tracing::info!(%order_id, "order purged");
        publish_all(self.publisher.as_ref(), vec![DomainEvent::Order(OrderEvent::Purged { order_id })]).await;
        Ok(())
    }

    /// Charges the order total. Only orders whose payment is `Pending` or
    /// `Failed` can be paid; zero totals are marked paid without a charge.
    ///
    /// The order is first moved to `Authorizing`, so at most one caller
    /// reaches the gateway. A gateway error settles the payment as `Failed`
    /// and is then returned.
    #[tracing::instrument(skip(self, viewer), fields(user_id = %viewer.user_id))]
    pub async fn pay_order(&self, viewer: &Viewer, order_id: Uuid) -> Result<Order> {
        let order = self.get_order(viewer, order_id).await?;
        if order.total() == Money::ZERO {
            return self.modify(order_id, |order| {
                ensure_payable(order)?;
                Ok(order.set_payment_status(PaymentStatus::Paid)?)
            }).await;
        }

        let claimed = self.modify(order_id, |order| {
            ensure_payable(order)?;
            Ok(order.set_payment_status(PaymentStatus::Authorizing)?)
        }).await?;

        let outcome = self.gateway.charge(order_id, claimed.total()).await;
        let next = match &outcome {
            Ok(PaymentOutcome::Approved { reference }) => {
                tracing::info!(%order_id, %reference, "payment approved");
                PaymentStatus::Paid
            }
            Ok(PaymentOutcome::Declined { reason }) => {
                tracing::warn!(%order_id, %reason, "payment declined");
                PaymentStatus::Failed
            }
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "payment gateway failed");
                PaymentStatus::Failed
            }
        };
        let settled = self.modify(order_id, |order| {
            if order.payment_status() != PaymentStatus::Authorizing {
                return Err(EcommerceError::InvalidState(format!(
                    "order {} payment is {}", order.order_number(), order.payment_status()
                )));
            }
            Ok(order.set_payment_status(next)?)
        }).await?;
        outcome?;
        Ok(settled)
    }

    async fn load(&self, order_id: Uuid) -> Result<Order> {
        with_timeout(self.timeout, "order lookup", self.store.get_order(order_id)).await
    }

    /// Reloads the order, applies `apply` and writes it back conditioned on
    /// the state it was loaded in. Lost races are retried from a fresh read.
    async fn modify<F>(&self, order_id: Uuid, mut apply: F) -> Result<Order>
    where
        F: FnMut(&mut Order) -> Result<()> + Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut order = self.load(order_id).await?;
            let expected = order.state();
            apply(&mut order)?;
            match with_timeout(self.timeout, "order update", self.store.update_order(&order, expected)).await {
                Ok(()) => {
                    publish_all(self.publisher.as_ref(), order.take_events()).await;
                    return Ok(order);
                }
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    tracing::debug!(%order_id, attempt, error = %e, "order update contended, retrying");
                    tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn ensure_payable(order: &Order) -> Result<()> {
    match order.payment_status() {
        PaymentStatus::Authorizing => Err(EcommerceError::Conflict(format!(
            "payment for order {} is already in progress", order.order_number()
        ))),
        status if !status.can_transition_to(PaymentStatus::Paid) => Err(EcommerceError::InvalidState(format!(
            "order {} payment is {status}", order.order_number()
        ))),
        _ if order.status() == OrderStatus::Cancelled => Err(EcommerceError::InvalidState(format!(
            "order {} is cancelled", order.order_number()
        ))),
        _ => Ok(()),
    }
}
