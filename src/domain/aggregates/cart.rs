//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::product::Product;
use crate::domain::value_objects::Quantity;

/// Display data copied from the product when the line was added.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
}

impl From<&Product> for ProductSnapshot {
    fn from(p: &Product) -> Self {
        Self { name: p.name.clone(), price: p.effective_price(), image: p.primary_image().map(str::to_string) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub product_id: Uuid,
    pub quantity: Quantity,
    pub product: ProductSnapshot,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLineItem {
    pub fn new(product: &Product, quantity: Quantity, now: DateTime<Utc>) -> Self {
        Self { product_id: product.id, quantity, product: product.into(), added_at: now, updated_at: now }
    }

    pub fn line_total(&self) -> Decimal { self.product.price * self.quantity.as_decimal() }
}

/// Ordered bag lines, one per product.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartLineItem>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Keeps the first line per product when given duplicates.
    pub fn from_items(items: Vec<CartLineItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            if !cart.contains(&item.product_id) { cart.items.push(item); }
        }
        cart
    }

    pub fn items(&self) -> &[CartLineItem] { &self.items }
    pub fn into_items(self) -> Vec<CartLineItem> { self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn line_count(&self) -> usize { self.items.len() }
    pub fn contains(&self, product_id: &Uuid) -> bool { self.items.iter().any(|i| &i.product_id == product_id) }
    pub fn get(&self, product_id: &Uuid) -> Option<&CartLineItem> { self.items.iter().find(|i| &i.product_id == product_id) }

    /// Sum of quantities across lines.
    pub fn total_items(&self) -> u32 { self.items.iter().map(|i| i.quantity.value()).sum() }

    /// Sum of price x quantity across lines.
    pub fn total_price(&self) -> Decimal { self.items.iter().map(CartLineItem::line_total).sum() }

    /// Adds a product, accumulating quantity onto an existing line for the same product.
    pub fn add(&mut self, product: &Product, quantity: Quantity, now: DateTime<Utc>) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == product.id) {
            existing.quantity = existing.quantity.add(quantity);
            existing.updated_at = now;
        } else {
            self.items.push(CartLineItem::new(product, quantity, now));
        }
    }

    /// Zero or negative quantities remove the line. Unknown products are ignored.
    pub fn set_quantity(&mut self, product_id: &Uuid, quantity: i64, now: DateTime<Utc>) {
        match Quantity::from_signed(quantity) {
            None => { self.remove(product_id); }
            Some(q) => {
                if let Some(item) = self.items.iter_mut().find(|i| &i.product_id == product_id) {
                    item.quantity = q;
                    item.updated_at = now;
                }
            }
        }
    }

    /// Returns whether a line was removed.
    pub fn remove(&mut self, product_id: &Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|i| &i.product_id != product_id);
        self.items.len() != before
    }

    pub fn clear(&mut self) { self.items.clear(); }
}
