//! Storage seams.
//!
//! Services never talk to a database handle directly; they receive an
//! `Arc<dyn Store>` so tests can swap in [`MemoryStore`].
//!
//! The only multi-record write is [`OrderRepository::commit_order`]. Every
//! stock and coupon write inside it is conditioned on the value read during
//! validation, and the whole unit either applies or leaves no trace.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::aggregates::{Cart, Coupon, Order, OrderState, Product};
use crate::domain::value_objects::{CouponCode, ProductId, UserId};
use crate::Result;

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Fails with `NotFound` when the product does not exist.
    async fn get_product(&self, id: &ProductId) -> Result<Product>;

    /// Decrements stock by `quantity` only if it still equals `expected_stock`,
    /// failing with `Conflict` otherwise.
    async fn conditional_decrement_stock(&self, id: &ProductId, quantity: u32, expected_stock: u32) -> Result<()>;
}

/// Carts are whole documents; concurrent saves for one user are last-write-wins.
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn load_cart(&self, user_id: &UserId) -> Result<Option<Cart>>;
    async fn save_cart(&self, cart: &Cart) -> Result<()>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn find_coupon_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>>;
    async fn get_coupon(&self, id: Uuid) -> Result<Coupon>;

    /// Adds one use if `used_count` still equals `expected_used_count` and the
    /// limit is not reached; `Conflict` otherwise.
    async fn record_usage(&self, id: Uuid, expected_used_count: u32) -> Result<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Applies every effect of `commit` atomically or none of them.
    async fn commit_order(&self, commit: &OrderCommit) -> Result<()>;
    async fn get_order(&self, id: Uuid) -> Result<Order>;
    /// Newest first.
    async fn list_orders_for_user(&self, user_id: &UserId) -> Result<Vec<Order>>;
    /// Replaces a stored order only if its status pair still equals
    /// `expected`; `Conflict` otherwise.
    async fn update_order(&self, order: &Order, expected: OrderState) -> Result<()>;
    async fn purge_order(&self, id: Uuid) -> Result<()>;
}

pub trait Store: ProductCatalog + CartRepository + CouponRepository + OrderRepository {}

impl<T> Store for T where T: ProductCatalog + CartRepository + CouponRepository + OrderRepository {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StockDecrement {
    pub product_id: ProductId,
    pub quantity: u32,
    pub expected_stock: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CouponRedemption {
    pub coupon_id: Uuid,
    pub expected_used_count: u32,
}

/// Everything a successful placement writes.
#[derive(Clone, Debug)]
pub struct OrderCommit {
    pub order: Order,
    pub decrements: Vec<StockDecrement>,
    pub redemption: Option<CouponRedemption>,
}
