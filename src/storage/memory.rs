//! In-process store.
//!
//! One mutex guards the whole dataset, so a commit's checks and writes are a
//! single critical section. Used for tests and for running without a database.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;
use crate::domain::aggregates::{Cart, Coupon, Order, OrderState, Product};
use crate::domain::value_objects::{CouponCode, ProductId, UserId};
use crate::storage::{CartRepository, CouponRepository, OrderCommit, OrderRepository, ProductCatalog};
use crate::{EcommerceError, Result};

#[derive(Default)]
struct Inner {
    products: HashMap<ProductId, Product>,
    carts: HashMap<UserId, Cart>,
    coupons: HashMap<Uuid, Coupon>,
    orders: HashMap<Uuid, Order>,
    failing_commits: u32,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn upsert_product(&self, product: Product) {
        self.inner.lock().products.insert(product.id.clone(), product);
    }

    pub fn upsert_coupon(&self, coupon: Coupon) {
        let mut inner = self.inner.lock();
        inner.coupons.retain(|_, c| c.code != coupon.code || c.id == coupon.id);
        inner.coupons.insert(coupon.id, coupon);
    }

    pub fn product(&self, id: &ProductId) -> Option<Product> { self.inner.lock().products.get(id).cloned() }
    pub fn coupon(&self, id: Uuid) -> Option<Coupon> { self.inner.lock().coupons.get(&id).cloned() }
    pub fn order_count(&self) -> usize { self.inner.lock().orders.len() }

    /// Makes the next `n` commits fail with `Unavailable` before touching anything.
    pub fn fail_next_commits(&self, n: u32) { self.inner.lock().failing_commits = n; }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn get_product(&self, id: &ProductId) -> Result<Product> {
        self.product(id).ok_or_else(|| EcommerceError::not_found("product", id))
    }

    async fn conditional_decrement_stock(&self, id: &ProductId, quantity: u32, expected_stock: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        let product = inner.products.get_mut(id).ok_or_else(|| EcommerceError::not_found("product", id))?;
        if product.stock.value() != expected_stock {
            return Err(EcommerceError::Conflict(format!("stock of product {id} changed")));
        }
        product.sell(quantity).map_err(|e| e.into_ecommerce(id))
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn load_cart(&self, user_id: &UserId) -> Result<Option<Cart>> {
        Ok(self.inner.lock().carts.get(user_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.inner.lock().carts.insert(cart.user_id().clone(), cart.clone());
        Ok(())
    }
}

#[async_trait]
impl CouponRepository for MemoryStore {
    async fn find_coupon_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        Ok(self.inner.lock().coupons.values().find(|c| &c.code == code).cloned())
    }

    async fn get_coupon(&self, id: Uuid) -> Result<Coupon> {
        self.coupon(id).ok_or_else(|| EcommerceError::not_found("coupon", id))
    }

    async fn record_usage(&self, id: Uuid, expected_used_count: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        let coupon = inner.coupons.get_mut(&id).ok_or_else(|| EcommerceError::not_found("coupon", id))?;
        let code = coupon.code.clone();
        coupon.redeem(expected_used_count).map_err(|e| e.into_ecommerce(&code))
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn commit_order(&self, commit: &OrderCommit) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.failing_commits > 0 {
            inner.failing_commits -= 1;
            return Err(EcommerceError::Unavailable("injected commit failure".into()));
        }
        let order_id = commit.order.id();
        if inner.orders.contains_key(&order_id) {
            return Err(EcommerceError::Conflict(format!("order {order_id} already exists")));
        }

        // Stage every write on copies; nothing is stored until all checks pass.
        let mut products = Vec::with_capacity(commit.decrements.len());
        for d in &commit.decrements {
            let mut product = inner.products.get(&d.product_id).cloned()
                .ok_or_else(|| EcommerceError::not_found("product", &d.product_id))?;
            if product.stock.value() != d.expected_stock {
                return Err(EcommerceError::Conflict(format!("stock of product {} changed", d.product_id)));
            }
            product.sell(d.quantity).map_err(|e| e.into_ecommerce(&d.product_id))?;
            products.push(product);
        }
        let coupon = match &commit.redemption {
            Some(r) => {
                let mut coupon = inner.coupons.get(&r.coupon_id).cloned()
                    .ok_or_else(|| EcommerceError::not_found("coupon", r.coupon_id))?;
                let code = coupon.code.clone();
                coupon.redeem(r.expected_used_count).map_err(|e| match e.into_ecommerce(&code) {
                    EcommerceError::LimitExceeded(msg) => EcommerceError::Conflict(format!("coupon {msg} exhausted concurrently")),
                    other => other,
                })?;
                Some(coupon)
            }
            None => None,
        };

        for product in products { inner.products.insert(product.id.clone(), product); }
        if let Some(coupon) = coupon { inner.coupons.insert(coupon.id, coupon); }
        let mut order = commit.order.clone();
        order.take_events();
        inner.orders.insert(order_id, order);
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Order> {
        self.inner.lock().orders.get(&id).cloned().ok_or_else(|| EcommerceError::not_found("order", id))
    }

    async fn list_orders_for_user(&self, user_id: &UserId) -> Result<Vec<Order>> {
        let inner = self.inner.lock();
        let mut orders: Vec<Order> = inner.orders.values().filter(|o| o.user_id() == user_id).cloned().collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(&a.id())));
        Ok(orders)
    }

    async fn update_order(&self, order: &Order, expected: OrderState) -> Result<()> {
        let mut inner = self.inner.lock();
        let stored = inner.orders.get_mut(&order.id()).ok_or_else(|| EcommerceError::not_found("order", order.id()))?;
        if stored.state() != expected {
            return Err(EcommerceError::Conflict(format!("order {} changed concurrently", order.order_number())));
        }
        let mut updated = order.clone();
        updated.take_events();
        *stored = updated;
        Ok(())
    }

    async fn purge_order(&self, id: Uuid) -> Result<()> {
        self.inner.lock().orders.remove(&id).map(|_| ()).ok_or_else(|| EcommerceError::not_found("order", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Address, LineItem, NewOrder, OrderStatus, PaymentStatus};
    use crate::domain::value_objects::Money;
    use crate::storage::{CouponRedemption, StockDecrement};
    use rust_decimal::Decimal;

    fn store_with(stock: u32) -> MemoryStore {
        let store = MemoryStore::new();
        store.upsert_product(Product::create("P1", "Widget", Money::from_cents(1000)).unwrap().with_stock(stock));
        store
    }

    fn commit(qty: u32, expected: u32, redemption: Option<CouponRedemption>) -> OrderCommit {
        let order = Order::place(NewOrder {
            user_id: "U1".into(),
            items: vec![LineItem::new("P1".into(), "Widget", qty, Money::from_cents(1000)).unwrap()],
            shipping_address: Address::default(),
            discount: Money::ZERO,
            coupon_code: None,
        }).unwrap();
        OrderCommit {
            order,
            decrements: vec![StockDecrement { product_id: "P1".into(), quantity: qty, expected_stock: expected }],
            redemption,
        }
    }

    #[tokio::test]
    async fn test_conditional_decrement_checks_expected_stock() {
        let store = store_with(5);
        let id = ProductId::from("P1");
        let err = store.conditional_decrement_stock(&id, 1, 4).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));
        store.conditional_decrement_stock(&id, 2, 5).await.unwrap();
        let p = store.get_product(&id).await.unwrap();
        assert_eq!((p.stock.value(), p.sales), (3, 2));
    }

    #[tokio::test]
    async fn test_stale_commit_leaves_no_trace() {
        let store = store_with(5);
        let coupon = Coupon::percentage(CouponCode::new("SAVE10").unwrap(), Decimal::TEN).with_usage_limit(1);
        let coupon_id = coupon.id;
        store.upsert_coupon(coupon);

        let err = store.commit_order(&commit(2, 4, Some(CouponRedemption { coupon_id, expected_used_count: 0 })))
            .await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.coupon(coupon_id).unwrap().used_count, 0);
        assert_eq!(store.product(&"P1".into()).unwrap().stock.value(), 5);

        store.commit_order(&commit(2, 5, Some(CouponRedemption { coupon_id, expected_used_count: 0 }))).await.unwrap();
        assert_eq!(store.order_count(), 1);
        assert_eq!(store.coupon(coupon_id).unwrap().used_count, 1);
        assert_eq!(store.product(&"P1".into()).unwrap().stock.value(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_coupon_aborts_commit() {
        let store = store_with(5);
        let coupon = Coupon::percentage(CouponCode::new("ONCE").unwrap(), Decimal::TEN).with_usage_limit(1);
        let coupon_id = coupon.id;
        store.upsert_coupon(coupon);
        store.record_usage(coupon_id, 0).await.unwrap();

        let err = store.commit_order(&commit(1, 5, Some(CouponRedemption { coupon_id, expected_used_count: 1 })))
            .await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));
        assert_eq!(store.product(&"P1".into()).unwrap().stock.value(), 5);
    }

    #[tokio::test]
    async fn test_injected_failures_are_unavailable() {
        let store = store_with(5);
        store.fail_next_commits(1);
        assert!(matches!(store.commit_order(&commit(1, 5, None)).await, Err(EcommerceError::Unavailable(_))));
        store.commit_order(&commit(1, 5, None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_order_update_checks_expected_state() {
        let store = store_with(5);
        let c = commit(1, 5, None);
        let placed = c.order.state();
        store.commit_order(&c).await.unwrap();

        let mut order = store.get_order(c.order.id()).await.unwrap();
        order.transition_to(OrderStatus::Processing).unwrap();
        store.update_order(&order, placed).await.unwrap();

        let mut stale = c.order.clone();
        stale.set_payment_status(PaymentStatus::Paid).unwrap();
        let err = store.update_order(&stale, placed).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));
        let stored = store.get_order(c.order.id()).await.unwrap();
        assert_eq!(stored.state(), OrderState { status: OrderStatus::Processing, payment_status: PaymentStatus::Pending });
    }

    #[tokio::test]
    async fn test_missing_cart_is_none() {
        let store = MemoryStore::new();
        assert!(store.load_cart(&"nobody".into()).await.unwrap().is_none());
    }
}
