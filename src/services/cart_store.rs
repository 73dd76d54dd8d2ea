//! Per-user carts.
//!
//! Every mutation loads the user's cart document, applies the change, and
//! saves the whole document back. Two concurrent writers for the same user
//! (two browser tabs) race as last-write-wins; carts of different users never
//! interact.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use crate::domain::aggregates::{Cart, CartItem, NewCartLine, Product};
use crate::domain::value_objects::{Money, ProductId, UserId};
use crate::services::retry::with_timeout;
use crate::storage::Store;
use crate::{EcommerceError, Result};

/// Add-to-cart input. `price` overrides the catalog's effective price.
#[derive(Clone, Debug)]
pub struct AddItem {
    pub product_id: ProductId,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: i64,
    pub price: Option<Money>,
}

/// Live catalog view of a product, joined at read time.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub effective_price: Money,
    pub stock: u32,
    pub in_stock: bool,
    pub image_url: Option<String>,
}

impl From<&Product> for ProductSummary {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id.clone(), name: p.name.clone(), price: p.price, sale_price: p.sale_price,
            effective_price: p.effective_price(), stock: p.stock.value(), in_stock: p.is_in_stock(),
            image_url: p.image_url.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
    #[serde(flatten)]
    pub item: CartItem,
    /// `None` when the product has since left the catalog.
    pub product: Option<ProductSummary>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub user_id: UserId,
    pub items: Vec<CartLineView>,
    pub total_quantity: u64,
    pub total_amount: Money,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartView {
    fn empty(user_id: &UserId) -> Self {
        Self { user_id: user_id.clone(), items: vec![], total_quantity: 0, total_amount: Money::ZERO, updated_at: None }
    }
}

pub struct CartStore {
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl CartStore {
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Self { Self { store, timeout } }

    #[tracing::instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn get_cart(&self, user_id: &UserId) -> Result<CartView> {
        match self.load(user_id).await? {
            Some(cart) => self.project(&cart).await,
            None => Ok(CartView::empty(user_id)),
        }
    }

    #[tracing::instrument(skip(self, user_id, item), fields(user_id = %user_id, product_id = %item.product_id, quantity = item.quantity))]
    pub async fn add_item(&self, user_id: &UserId, item: AddItem) -> Result<CartView> {
        let quantity = u32::try_from(item.quantity)
            .ok()
            .filter(|q| *q >= 1)
            .ok_or_else(|| EcommerceError::InvalidArgument(format!("quantity must be at least 1, got {}", item.quantity)))?;
        if item.price.is_some_and(|p| p.is_negative()) {
            return Err(EcommerceError::InvalidArgument("price must not be negative".into()));
        }
        let product = with_timeout(self.timeout, "product lookup", self.store.get_product(&item.product_id)).await?;
        let unit_price = item.price.unwrap_or_else(|| product.effective_price());

        let mut cart = self.load(user_id).await?.unwrap_or_else(|| Cart::new(user_id.clone()));
        let line_id = cart.add_item(NewCartLine {
            product_id: item.product_id, size: item.size, color: item.color, quantity, unit_price,
        })?;
        self.save(&cart).await?;
        tracing::debug!(%line_id, total_quantity = cart.total_quantity(), "cart item added");
        self.project(&cart).await
    }

    /// `quantity == 0` removes the line; negative quantities are rejected.
    #[tracing::instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn update_item_quantity(&self, user_id: &UserId, item_id: Uuid, quantity: i64) -> Result<CartView> {
        if quantity < 0 {
            return Err(EcommerceError::InvalidArgument(format!("quantity must not be negative, got {quantity}")));
        }
        let quantity = u32::try_from(quantity)
            .map_err(|_| EcommerceError::InvalidArgument(format!("quantity {quantity} is too large")))?;
        let mut cart = self.load(user_id).await?.ok_or_else(|| EcommerceError::not_found("cart item", item_id))?;
        cart.update_quantity(item_id, quantity)?;
        self.save(&cart).await?;
        self.project(&cart).await
    }

    /// Removing from a missing cart or removing an absent line is a no-op.
    #[tracing::instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn remove_item(&self, user_id: &UserId, item_id: Uuid) -> Result<CartView> {
        let Some(mut cart) = self.load(user_id).await? else { return Ok(CartView::empty(user_id)) };
        if cart.remove_item(item_id)? {
            self.save(&cart).await?;
        }
        self.project(&cart).await
    }

    /// Empties the cart but keeps the document.
    #[tracing::instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn clear(&self, user_id: &UserId) -> Result<CartView> {
        let Some(mut cart) = self.load(user_id).await? else { return Ok(CartView::empty(user_id)) };
        if !cart.is_empty() {
            cart.clear();
            self.save(&cart).await?;
        }
        self.project(&cart).await
    }

    async fn load(&self, user_id: &UserId) -> Result<Option<Cart>> {
        with_timeout(self.timeout, "cart load", self.store.load_cart(user_id)).await
    }

    async fn save(&self, cart: &Cart) -> Result<()> {
        with_timeout(self.timeout, "cart save", self.store.save_cart(cart)).await
    }

    /// Joins each line with the current catalog record of its product.
    async fn project(&self, cart: &Cart) -> Result<CartView> {
        let mut products: HashMap<&ProductId, Option<ProductSummary>> = HashMap::new();
        for item in cart.items() {
            if products.contains_key(&item.product_id) { continue; }
            let summary = match with_timeout(self.timeout, "product lookup", self.store.get_product(&item.product_id)).await {
                Ok(product) => Some(ProductSummary::from(&product)),
                Err(EcommerceError::NotFound(_)) => None,
                Err(e) => return Err(e),
            };
            products.insert(&item.product_id, summary);
        }
        Ok(CartView {
            user_id: cart.user_id().clone(),
            items: cart.items().iter().map(|item| CartLineView {
                item: item.clone(),
                product: products.get(&item.product_id).cloned().flatten(),
            }).collect(),
            total_quantity: cart.total_quantity(),
            total_amount: cart.total_amount(),
            updated_at: Some(cart.updated_at()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, CartStore) {
        let store = Arc::new(MemoryStore::new());
        store.upsert_product(Product::create("P1", "Tee", Money::from_cents(2000)).unwrap()
            .with_sale_price(Money::from_cents(1500)).unwrap().with_stock(10));
        store.upsert_product(Product::create("P2", "Cap", Money::from_cents(1200)).unwrap().with_stock(3));
        let carts = CartStore::new(store.clone(), Duration::from_secs(1));
        (store, carts)
    }

    fn add(product: &str, size: &str, quantity: i64) -> AddItem {
        AddItem { product_id: product.into(), size: Some(size.into()), color: None, quantity, price: None }
    }

    #[tokio::test]
    async fn test_add_merges_and_uses_sale_price() {
        let (_, carts) = setup();
        let user = UserId::from("U1");
        carts.add_item(&user, add("P1", "M", 2)).await.unwrap();
        let view = carts.add_item(&user, add("P1", "M", 3)).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].item.quantity, 5);
        assert_eq!(view.items[0].item.unit_price, Money::from_cents(1500));
        assert_eq!(view.total_quantity, 5);
        assert_eq!(view.total_amount, Money::from_cents(7500));
        assert_eq!(view.items[0].product.as_ref().unwrap().name, "Tee");
    }

    #[tokio::test]
    async fn test_explicit_price_override() {
        let (_, carts) = setup();
        let user = UserId::from("U1");
        let mut item = add("P2", "OS", 1);
        item.price = Some(Money::from_cents(999));
        let view = carts.add_item(&user, item).await.unwrap();
        assert_eq!(view.total_amount, Money::from_cents(999));
    }

    #[tokio::test]
    async fn test_oversized_price_override_is_rejected() {
        let (_, carts) = setup();
        let carts = Arc::new(carts);
        let user = UserId::from("U1");
        carts.add_item(&user, add("P1", "M", 1)).await.unwrap();
        let mut item = add("P2", "OS", 2);
        item.price = Some(Money::new(rust_decimal::Decimal::MAX));
        let task = tokio::spawn({
            let carts = carts.clone();
            let user = user.clone();
            async move { carts.add_item(&user, item).await }
        });
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, EcommerceError::InvalidArgument(_)));
        let view = carts.get_cart(&user).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.total_amount, Money::from_cents(1500));
    }

    #[tokio::test]
    async fn test_add_unknown_product_is_not_found() {
        let (_, carts) = setup();
        let err = carts.add_item(&"U1".into(), add("NOPE", "M", 1)).await.unwrap_err();
        assert!(matches!(err, EcommerceError::NotFound(_)));
        let err = carts.add_item(&"U1".into(), add("P1", "M", 0)).await.unwrap_err();
        assert!(matches!(err, EcommerceError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_update_quantity_rules() {
        let (_, carts) = setup();
        let user = UserId::from("U1");
        let view = carts.add_item(&user, add("P1", "M", 2)).await.unwrap();
        let id = view.items[0].item.id;

        let err = carts.update_item_quantity(&user, id, -1).await.unwrap_err();
        assert!(matches!(err, EcommerceError::InvalidArgument(_)));
        let err = carts.update_item_quantity(&user, Uuid::now_v7(), 1).await.unwrap_err();
        assert!(matches!(err, EcommerceError::NotFound(_)));

        let view = carts.update_item_quantity(&user, id, 4).await.unwrap();
        assert_eq!(view.total_amount, Money::from_cents(6000));
        let view = carts.update_item_quantity(&user, id, 0).await.unwrap();
        assert!(view.items.is_empty());
        assert_eq!(view.total_quantity, 0);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (_, carts) = setup();
        let user = UserId::from("ghost");
        let first = carts.clear(&user).await.unwrap();
        let second = carts.clear(&user).await.unwrap();
        assert_eq!(first, second);
        assert!(first.items.is_empty());

        let removed = carts.remove_item(&user, Uuid::now_v7()).await.unwrap();
        assert!(removed.items.is_empty());

        carts.add_item(&user, add("P2", "OS", 1)).await.unwrap();
        let a = carts.clear(&user).await.unwrap();
        let b = carts.clear(&user).await.unwrap();
        assert!(a.items.is_empty() && b.items.is_empty());
        assert_eq!(a.total_amount, b.total_amount);
    }

    #[tokio::test]
    async fn test_projection_reflects_live_product() {
        let (store, carts) = setup();
        let user = UserId::from("U1");
        carts.add_item(&user, add("P2", "OS", 1)).await.unwrap();
        let mut cap = store.product(&"P2".into()).unwrap();
        cap.price = Money::from_cents(1800);
        store.upsert_product(cap);

        let view = carts.get_cart(&user).await.unwrap();
        // Snapshot stays, live view moves.
        assert_eq!(view.items[0].item.unit_price, Money::from_cents(1200));
        assert_eq!(view.items[0].product.as_ref().unwrap().price, Money::from_cents(1800));
    }
}
