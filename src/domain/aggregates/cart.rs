//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{Money, ProductId, UserId};

/// One cart per user. `total_quantity` and `total_amount` are derived from
/// the lines on every mutation and are never written independently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    user_id: UserId,
    items: Vec<CartItem>,
    total_quantity: u64,
    total_amount: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: ProductId,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: u32,
    /// Price captured when the line was added; display only, orders re-price.
    pub unit_price: Money,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn line_total(&self) -> Option<Money> { self.unit_price.checked_mul(self.quantity) }

    fn same_variant(&self, product_id: &ProductId, size: &Option<String>, color: &Option<String>) -> bool {
        &self.product_id == product_id && &self.size == size && &self.color == color
    }
}

/// Request to put `quantity` units of a product variant into a cart.
#[derive(Clone, Debug)]
pub struct NewCartLine {
    pub product_id: ProductId,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl Cart {
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self { user_id, items: vec![], total_quantity: 0, total_amount: Money::ZERO, created_at: now, updated_at: now }
    }

    pub fn user_id(&self) -> &UserId { &self.user_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn total_quantity(&self) -> u64 { self.total_quantity }
    pub fn total_amount(&self) -> Money { self.total_amount }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Merges into the line with the same (product, size, color) or appends a
    /// new one. Returns the id of the affected line.
    pub fn add_item(&mut self, line: NewCartLine) -> Result<Uuid, CartError> {
        if line.quantity == 0 { return Err(CartError::InvalidQuantity); }
        if line.unit_price.is_negative() { return Err(CartError::NegativePrice); }
        if line.unit_price > Money::MAX_PRICE { return Err(CartError::PriceOutOfRange(line.unit_price)); }
        let mut items = self.items.clone();
        let id = match items.iter_mut().find(|i| i.same_variant(&line.product_id, &line.size, &line.color)) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or(CartError::QuantityOverflow)?;
                existing.id
            }
            None => {
                let item = CartItem {
                    id: Uuid::now_v7(), product_id: line.product_id, size: line.size, color: line.color,
                    quantity: line.quantity, unit_price: line.unit_price, added_at: Utc::now(),
                };
                let id = item.id;
                items.push(item);
                id
            }
        };
        self.replace_items(items)?;
        Ok(id)
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn update_quantity(&mut self, item_id: Uuid, quantity: u32) -> Result<(), CartError> {
        let mut items = self.items.clone();
        let item = items.iter_mut().find(|i| i.id == item_id).ok_or(CartError::ItemNotFound(item_id))?;
        if quantity == 0 { items.retain(|i| i.id != item_id); }
        else { item.quantity = quantity; }
        self.replace_items(items)
    }

    /// Removes a line if present. Returns whether anything was removed.
    pub fn remove_item(&mut self, item_id: Uuid) -> Result<bool, CartError> {
        let before = self.items.len();
        let items: Vec<CartItem> = self.items.iter().filter(|i| i.id != item_id).cloned().collect();
        let removed = items.len() != before;
        self.replace_items(items)?;
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.total_quantity = 0;
        self.total_amount = Money::ZERO;
        self.updated_at = Utc::now();
    }

    /// Installs `items` only if their totals are representable.
    fn replace_items(&mut self, items: Vec<CartItem>) -> Result<(), CartError> {
        let line_totals = items.iter().map(CartItem::line_total).collect::<Option<Vec<_>>>();
        let total_amount = line_totals
            .and_then(Money::checked_sum)
            .map(Money::rounded)
            .filter(|total| *total <= Money::MAX_TOTAL)
            .ok_or(CartError::AmountOverflow)?;
        self.total_quantity = items.iter().map(|i| u64::from(i.quantity)).sum();
        self.total_amount = total_amount;
        self.items = items;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart item {0} not found")]
    ItemNotFound(Uuid),
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("unit price must not be negative")]
    NegativePrice,
    #[error("line quantity overflow")]
    QuantityOverflow,
    #[error("unit price {0} exceeds the maximum")]
    PriceOutOfRange(Money),
    #[error("cart total exceeds the maximum amount")]
    AmountOverflow,
}

impl From<CartError> for crate::EcommerceError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound(id) => Self::not_found("cart item", id),
            other => Self::InvalidArgument(other.to_string()),
        }
    }
}
