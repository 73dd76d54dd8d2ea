//! Application services.

pub mod cart_store;
pub mod coupon_engine;
pub mod order_processor;
pub mod orders;
pub mod payments;
pub mod retry;

pub use cart_store::{AddItem, CartStore, CartView};
pub use coupon_engine::{CouponEngine, CouponQuote};
pub use order_processor::{OrderItemRequest, OrderProcessor, PlaceOrder};
pub use orders::{OrderService, Viewer};
pub use payments::{MockGateway, PaymentGateway, PaymentOutcome};
pub use retry::RetryPolicy;
