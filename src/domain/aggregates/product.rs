//! Product Aggregate
//!
//! Catalog administration lives outside this service; the checkout engine
//! only reads prices and moves `stock` and `sales`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::domain::value_objects::{Money, ProductId, Quantity};
use crate::EcommerceError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub stock: Quantity,
    pub sales: u64,
    pub image_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(id: impl Into<ProductId>, name: impl Into<String>, price: Money) -> Result<Self, ProductError> {
        if price.is_negative() { return Err(ProductError::NegativePrice); }
        Ok(Self {
            id: id.into(), name: name.into(), price, sale_price: None, stock: Quantity::default(),
            sales: 0, image_url: None, updated_at: Utc::now(),
        })
    }

    pub fn with_stock(mut self, stock: u32) -> Self { self.stock = Quantity::new(stock); self }

    pub fn with_sale_price(mut self, sale_price: Money) -> Result<Self, ProductError> {
        if sale_price.is_negative() || sale_price > self.price { return Err(ProductError::SalePriceAbovePrice); }
        self.sale_price = Some(sale_price);
        Ok(self)
    }

    /// Sale price when one is set below the list price, otherwise the list price.
    pub fn effective_price(&self) -> Money {
        match self.sale_price {
            Some(sale) if sale < self.price => sale,
            _ => self.price,
        }
    }

    pub fn is_in_stock(&self) -> bool { !self.stock.is_zero() }
    pub fn can_fulfill(&self, qty: u32) -> bool { self.stock.value() >= qty }

    /// Takes `qty` units out of stock and counts them as sold.
    pub fn sell(&mut self, qty: u32) -> Result<(), ProductError> {
        self.stock = self.stock.subtract(qty).ok_or(ProductError::InsufficientStock {
            requested: qty, available: self.stock.value(),
        })?;
        self.sales = self.sales.saturating_add(u64::from(qty));
        self.touch();
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("price must not be negative")]
    NegativePrice,
    #[error("sale price must be between zero and the list price")]
    SalePriceAbovePrice,
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },
}

impl ProductError {
    pub fn into_ecommerce(self, product_id: &ProductId) -> EcommerceError {
        match self {
            Self::InsufficientStock { requested, available } => EcommerceError::InsufficientStock {
                product_id: product_id.clone(), requested, available,
            },
            other => EcommerceError::InvalidArgument(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Product {
        Product::create("P1", "Widget", Money::from_cents(1000)).unwrap().with_stock(5)
    }

    #[test]
    fn test_effective_price_prefers_lower_sale_price() {
        let p = widget().with_sale_price(Money::from_cents(800)).unwrap();
        assert_eq!(p.effective_price(), Money::from_cents(800));
        let mut q = widget();
        q.sale_price = Some(Money::from_cents(1200));
        assert_eq!(q.effective_price(), Money::from_cents(1000));
        assert!(widget().with_sale_price(Money::from_cents(1500)).is_err());
    }

    #[test]
    fn test_sell_never_goes_negative() {
        let mut p = widget();
        p.sell(5).unwrap();
        assert!(!p.is_in_stock());
        assert_eq!(p.sales, 5);
        assert_eq!(p.sell(1), Err(ProductError::InsufficientStock { requested: 1, available: 0 }));
        assert!(!p.can_fulfill(1));
    }
}
