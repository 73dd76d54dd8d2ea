//! Aggregates module
pub mod cart;
pub mod coupon;
pub mod order;
pub mod product;

pub use cart::{Cart, CartError, CartItem, NewCartLine};
pub use coupon::{Coupon, CouponError, CouponType};
pub use order::{Address, LineItem, NewOrder, Order, OrderError, OrderState, OrderStatus, PaymentStatus};
pub use product::{Product, ProductError};
