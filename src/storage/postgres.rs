//! Postgres store.
//!
//! Carts and orders are kept as JSONB documents next to the few columns that
//! are queried or conditioned on. Order commits run in one transaction whose
//! stock and coupon updates carry the expected prior value in their `WHERE`
//! clause; an update that matches no row aborts the transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;
use crate::domain::aggregates::{Cart, Coupon, CouponType, Order, OrderState, Product};
use crate::domain::value_objects::{CouponCode, Money, ProductId, Quantity, UserId};
use crate::storage::{CartRepository, CouponRepository, OrderCommit, OrderRepository, ProductCatalog};
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects with `timeout` applied both to pool checkout and to every statement.
    pub async fn connect(url: &str, timeout: Duration) -> std::result::Result<Self, sqlx::Error> {
        let options = PgConnectOptions::from_str(url)?
            .options([("statement_timeout", timeout.as_millis().to_string())]);
        let pool = PgPoolOptions::new().max_connections(10).acquire_timeout(timeout).connect_with(options).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Contention becomes `Conflict`, outages `Unavailable`, the rest `Internal`.
fn db_error(e: sqlx::Error) -> EcommerceError {
    match &e {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // serialization_failure, deadlock_detected, unique_violation
            Some("40001" | "40P01" | "23505") => EcommerceError::Conflict(db.message().to_string()),
            // query_canceled (statement_timeout)
            Some("57014") => EcommerceError::Unavailable(db.message().to_string()),
            _ => EcommerceError::Internal(e.to_string()),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => EcommerceError::Unavailable(e.to_string()),
        _ => EcommerceError::Internal(e.to_string()),
    }
}

fn to_i32(value: u32, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| EcommerceError::InvalidArgument(format!("{what} {value} is out of range")))
}

fn to_u32(value: i32, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| EcommerceError::Internal(format!("stored {what} {value} is negative")))
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    price: Decimal,
    sale_price: Option<Decimal>,
    stock: i32,
    sales: i64,
    image_url: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = EcommerceError;
    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(Product {
            id: ProductId::new(r.id), name: r.name, price: Money::new(r.price), sale_price: r.sale_price.map(Money::new),
            stock: Quantity::new(to_u32(r.stock, "stock")?), sales: u64::try_from(r.sales).unwrap_or_default(),
            image_url: r.image_url, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    coupon_type: String,
    value: Decimal,
    min_order_amount: Option<Decimal>,
    max_discount: Option<Decimal>,
    usage_limit: Option<i32>,
    used_count: i32,
    expiry_date: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = EcommerceError;
    fn try_from(r: CouponRow) -> Result<Self> {
        Ok(Coupon {
            id: r.id,
            code: CouponCode::new(r.code).map_err(|e| EcommerceError::Internal(e.to_string()))?,
            coupon_type: CouponType::from_str(&r.coupon_type)?,
            value: r.value,
            min_order_amount: r.min_order_amount.map(Money::new),
            max_discount: r.max_discount.map(Money::new),
            usage_limit: r.usage_limit.map(|l| to_u32(l, "usage limit")).transpose()?,
            used_count: to_u32(r.used_count, "used count")?,
            expiry_date: r.expiry_date,
            is_active: r.is_active,
            created_at: r.created_at,
        })
    }
}

const COUPON_COLUMNS: &str = "id, code, coupon_type, value, min_order_amount, max_discount, usage_limit, used_count, expiry_date, is_active, created_at";

#[async_trait]
impl ProductCatalog for PgStore {
    async fn get_product(&self, id: &ProductId) -> Result<Product> {
        sqlx::query_as::<_, ProductRow>("SELECT id, name, price, sale_price, stock, sales, image_url, updated_at FROM products WHERE id = $1")
            .bind(id.as_str()).fetch_optional(&self.pool).await.map_err(db_error)?
            .ok_or_else(|| EcommerceError::not_found("product", id))?
            .try_into()
    }

    async fn conditional_decrement_stock(&self, id: &ProductId, quantity: u32, expected_stock: u32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET stock = stock - $2, sales = sales + $2, updated_at = NOW() WHERE id = $1 AND stock = $3 AND stock >= $2")
            .bind(id.as_str()).bind(to_i32(quantity, "quantity")?).bind(to_i32(expected_stock, "stock")?)
            .execute(&self.pool).await.map_err(db_error)?;
        if result.rows_affected() == 0 {
            // Distinguish a missing product from a lost race.
            self.get_product(id).await?;
            return Err(EcommerceError::Conflict(format!("stock of product {id} changed")));
        }
        Ok(())
    }
}

#[async_trait]
impl CartRepository for PgStore {
    async fn load_cart(&self, user_id: &UserId) -> Result<Option<Cart>> {
        let doc = sqlx::query_scalar::<_, Json<Cart>>("SELECT document FROM carts WHERE user_id = $1")
            .bind(user_id.as_str()).fetch_optional(&self.pool).await.map_err(db_error)?;
        Ok(doc.map(|Json(cart)| cart))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let total_quantity = i64::try_from(cart.total_quantity())
            .map_err(|_| EcommerceError::InvalidArgument("cart quantity out of range".into()))?;
        sqlx::query(
            "INSERT INTO carts (user_id, document, total_quantity, total_amount, updated_at) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id) DO UPDATE SET document = EXCLUDED.document, total_quantity = EXCLUDED.total_quantity, \
             total_amount = EXCLUDED.total_amount, updated_at = EXCLUDED.updated_at",
        )
        .bind(cart.user_id().as_str()).bind(Json(cart)).bind(total_quantity)
        .bind(cart.total_amount().amount()).bind(cart.updated_at())
        .execute(&self.pool).await.map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl CouponRepository for PgStore {
    async fn find_coupon_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"))
            .bind(code.as_str()).fetch_optional(&self.pool).await.map_err(db_error)?
            .map(Coupon::try_from).transpose()
    }

    async fn get_coupon(&self, id: Uuid) -> Result<Coupon> {
        sqlx::query_as::<_, CouponRow>(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await.map_err(db_error)?
            .ok_or_else(|| EcommerceError::not_found("coupon", id))?
            .try_into()
    }

    async fn record_usage(&self, id: Uuid, expected_used_count: u32) -> Result<()> {
        let result = sqlx::query(
            "UPDATE coupons SET used_count = used_count + 1 \
             WHERE id = $1 AND used_count = $2 AND (usage_limit IS NULL OR used_count < usage_limit)",
        )
        .bind(id).bind(to_i32(expected_used_count, "used count")?)
        .execute(&self.pool).await.map_err(db_error)?;
        if result.rows_affected() == 0 {
            let coupon = self.get_coupon(id).await?;
            if coupon.is_exhausted() { return Err(EcommerceError::LimitExceeded(coupon.code.to_string())); }
            return Err(EcommerceError::Conflict(format!("coupon {} usage changed concurrently", coupon.code)));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn commit_order(&self, commit: &OrderCommit) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        for d in &commit.decrements {
            let result = sqlx::query(
                "UPDATE products SET stock = stock - $2, sales = sales + $2, updated_at = NOW() \
                 WHERE id = $1 AND stock = $3 AND stock >= $2",
            )
            .bind(d.product_id.as_str()).bind(to_i32(d.quantity, "quantity")?).bind(to_i32(d.expected_stock, "stock")?)
            .execute(&mut *tx).await.map_err(db_error)?;
            if result.rows_affected() == 0 {
                return Err(EcommerceError::Conflict(format!("stock of product {} changed", d.product_id)));
            }
        }

        if let Some(r) = &commit.redemption {
            let result = sqlx::query(
                "UPDATE coupons SET used_count = used_count + 1 \
                 WHERE id = $1 AND used_count = $2 AND (usage_limit IS NULL OR used_count < usage_limit)",
            )
            .bind(r.coupon_id).bind(to_i32(r.expected_used_count, "used count")?)
            .execute(&mut *tx).await.map_err(db_error)?;
            if result.rows_affected() == 0 {
                return Err(EcommerceError::Conflict(format!("coupon {} usage changed concurrently", r.coupon_id)));
            }
        }

        let order = &commit.order;
        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, status, payment_status, total, document, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(order.id()).bind(order.order_number()).bind(order.user_id().as_str())
        .bind(order.status().to_string()).bind(order.payment_status().to_string())
        .bind(order.total().amount()).bind(Json(order)).bind(order.created_at()).bind(order.updated_at())
        .execute(&mut *tx).await.map_err(db_error)?;

        tx.commit().await.map_err(db_error)
    }

    async fn get_order(&self, id: Uuid) -> Result<Order> {
        sqlx::query_scalar::<_, Json<Order>>("SELECT document FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await.map_err(db_error)?
            .map(|Json(order)| order)
            .ok_or_else(|| EcommerceError::not_found("order", id))
    }

    async fn list_orders_for_user(&self, user_id: &UserId) -> Result<Vec<Order>> {
        let docs = sqlx::query_scalar::<_, Json<Order>>("SELECT document FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC")
            .bind(user_id.as_str()).fetch_all(&self.pool).await.map_err(db_error)?;
        Ok(docs.into_iter().map(|Json(order)| order).collect())
    }

    async fn update_order(&self, order: &Order, expected: OrderState) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, payment_status = $3, document = $4, updated_at = $5 \
             WHERE id = $1 AND status = $6 AND payment_status = $7",
        )
        .bind(order.id()).bind(order.status().to_string()).bind(order.payment_status().to_string())
        .bind(Json(order)).bind(order.updated_at())
        .bind(expected.status.to_string()).bind(expected.payment_status.to_string())
        .execute(&self.pool).await.map_err(db_error)?;
        if result.rows_affected() == 0 {
            // Distinguish a purged order from a lost race.
            self.get_order(order.id()).await?;
            return Err(EcommerceError::Conflict(format!("order {} changed concurrently", order.order_number())));
        }
        Ok(())
    }

    async fn purge_order(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&self.pool).await.map_err(db_error)?;
        if result.rows_affected() == 0 { return Err(EcommerceError::not_found("order", id)); }
        Ok(())
    }
}
