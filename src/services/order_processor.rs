//! Order placement.
//!
//! A placement attempt reads every product once, prices the lines from the
//! live catalog, validates the coupon against the subtotal and then hands one
//! [`OrderCommit`] to the store. The commit carries the stock and usage
//! counts observed during validation; if any of them moved, the store rejects
//! the whole unit with `Conflict` and the attempt is re-run from scratch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use crate::domain::aggregates::{Address, LineItem, NewOrder, Order, Product};
use crate::domain::events::{CouponEvent, DomainEvent};
use crate::domain::value_objects::{Money, ProductId, UserId};
use crate::messaging::{publish_all, EventPublisher};
use crate::services::coupon_engine::{CouponEngine, CouponQuote};
use crate::services::retry::{with_timeout, RetryPolicy};
use crate::storage::{OrderCommit, StockDecrement, Store};
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PlaceOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItemRequest>,
    pub shipping_address: Address,
    pub coupon_code: Option<String>,
}

/// Where a placement attempt is; only used for tracing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementState {
    Validating,
    StockReserved,
    Committed,
    Rejected,
    RolledBack,
}

impl fmt::Display for PlacementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validating => "validating",
            Self::StockReserved => "stock_reserved",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

pub struct OrderProcessor {
    store: Arc<dyn Store>,
    coupons: Arc<CouponEngine>,
    publisher: Arc<dyn EventPublisher>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl OrderProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        coupons: Arc<CouponEngine>,
        publisher: Arc<dyn EventPublisher>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self { store, coupons, publisher, timeout, retry }
    }

    /// Places an order all-or-nothing. `Conflict` and `Unavailable` are
    /// retried up to the policy's bound; every other failure is returned as is.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, lines = request.items.len()))]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<Order> {
        if request.items.is_empty() {
            return Err(EcommerceError::InvalidArgument("order must contain at least one item".into()));
        }
        if let Some(item) = request.items.iter().find(|i| i.quantity == 0) {
            return Err(EcommerceError::InvalidArgument(format!("quantity for product {} must be at least 1", item.product_id)));
        }
        let demand = aggregate_demand(&request.items)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_place(&request, &demand).await {
                Ok(order) => return Ok(order),
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(attempt, error = %e, ?delay, "order placement contended, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(attempt, error = %e, "order placement gave up");
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn try_place(&self, request: &PlaceOrder, demand: &[(ProductId, u32)]) -> Result<Order> {
        tracing::debug!(state = %PlacementState::Validating);
        let products = match self.validate_stock(demand).await {
            Ok(products) => products,
            Err(e) => {
                tracing::debug!(state = %PlacementState::Rejected, error = %e);
                return Err(e);
            }
        };

        // Prices come from the catalog read above, not from any cart snapshot.
        let mut lines: Vec<LineItem> = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let Some(p) = products.get(&item.product_id) else { continue };
            lines.push(LineItem {
                size: item.size.clone(),
                color: item.color.clone(),
                ..LineItem::new(item.product_id.clone(), p.name.clone(), item.quantity, p.effective_price())?
            });
        }
        let subtotal = Money::checked_sum(lines.iter().map(|l| l.total))
            .ok_or_else(|| EcommerceError::InvalidArgument("order amount exceeds the maximum".into()))?
            .rounded();

        let quote = match &request.coupon_code {
            Some(code) => match self.coupons.validate(code, subtotal).await {
                Ok(quote) => Some(quote),
                Err(e) => {
                    tracing::debug!(state = %PlacementState::Rejected, error = %e);
                    return Err(e);
                }
            },
            None => None,
        };

        let order = Order::place(NewOrder {
            user_id: request.user_id.clone(),
            items: lines,
            shipping_address: request.shipping_address.clone(),
            discount: quote.as_ref().map_or(Money::ZERO, |q| q.discount_amount),
            coupon_code: quote.as_ref().map(|q| q.code.clone()),
        })?;
        let commit = OrderCommit {
            order,
            decrements: demand.iter().map(|(id, quantity)| StockDecrement {
                product_id: id.clone(),
                quantity: *quantity,
                expected_stock: products.get(id).map_or(0, |p| p.stock.value()),
            }).collect(),
            redemption: quote.as_ref().map(CouponQuote::redemption),
        };
        tracing::debug!(state = %PlacementState::StockReserved, order_id = %commit.order.id());

        self.commit(commit, quote).await
    }

    /// Reads each distinct product once and checks it can cover the demand.
    async fn validate_stock(&self, demand: &[(ProductId, u32)]) -> Result<HashMap<ProductId, Product>> {
        let mut products = HashMap::with_capacity(demand.len());
        for (id, quantity) in demand {
            let product = with_timeout(self.timeout, "product lookup", self.store.get_product(id)).await?;
            if !product.can_fulfill(*quantity) {
                return Err(EcommerceError::InsufficientStock {
                    product_id: id.clone(),
                    requested: *quantity,
                    available: product.stock.value(),
                });
            }
            products.insert(id.clone(), product);
        }
        Ok(products)
    }

    /// Runs the commit on its own task so that dropping the caller's future
    /// cannot stop it halfway; events go out from the same task afterwards.
    async fn commit(&self, commit: OrderCommit, quote: Option<CouponQuote>) -> Result<Order> {
        let store = self.store.clone();
        let publisher = self.publisher.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = store.commit_order(&commit).await {
                tracing::debug!(state = %PlacementState::RolledBack, error = %e);
                return Err(e);
            }
            let mut order = commit.order;
            tracing::info!(
                state = %PlacementState::Committed,
                order_id = %order.id(),
                order_number = order.order_number(),
                total = %order.total(),
                "order placed"
            );
            let mut events = order.take_events();
            if let Some(quote) = quote {
                events.push(DomainEvent::Coupon(CouponEvent::Redeemed {
                    coupon_id: quote.coupon_id, code: quote.code, order_id: order.id(),
                }));
            }
            publish_all(publisher.as_ref(), events).await;
            Ok(order)
        });
        task.await.map_err(|e| EcommerceError::Internal(format!("order commit task failed: {e}")))?
    }
}

/// Sums quantities per product, keeping first-appearance order.
fn aggregate_demand(items: &[OrderItemRequest]) -> Result<Vec<(ProductId, u32)>> {
    let mut demand: Vec<(ProductId, u32)> = Vec::new();
    for item in items {
        match demand.iter_mut().find(|(id, _)| id == &item.product_id) {
            Some((id, total)) => {
                *total = total.checked_add(item.quantity)
                    .ok_or_else(|| EcommerceError::InvalidArgument(format!("quantity for product {id} is too large")))?;
            }
            None => demand.push((item.product_id.clone(), item.quantity)),
        }
    }
    Ok(demand)
}
