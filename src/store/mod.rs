//! Data-store collaborator.
//!
//! Every component receives its store explicitly. [`PgStore`] talks to the
//! hosted Postgres database; [`MemoryStore`] keeps everything in process and
//! backs the test suite.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{
    Address, CartLineItem, Category, Order, OrderLineItem, OrderStatus, Product, Profile, WishlistEntry,
};
use crate::domain::value_objects::Quantity;
use crate::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    CreatedAt,
    Price,
    Name,
}

impl ProductSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created_at" => Some(Self::CreatedAt),
            "price" => Some(Self::Price),
            "name" => Some(Self::Name),
            _ => None,
        }
    }

    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "p.created_at",
            Self::Price => "p.price",
            Self::Name => "p.name",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub(crate) fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Product listing filters. `category` is a category slug.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    pub category: Option<String>,
    pub brand: Option<Uuid>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub available: Option<bool>,
    pub sort_by: ProductSort,
    pub sort_order: SortOrder,
}

impl ProductFilter {
    /// In-process evaluation of the non-category filters.
    pub fn matches(&self, p: &Product) -> bool {
        self.brand.map_or(true, |b| p.brand_id == Some(b))
            && self.available.map_or(true, |a| p.is_available == a)
            && self.min_price.map_or(true, |min| p.price >= min)
            && self.max_price.map_or(true, |max| p.price <= max)
            && self.search.as_deref().map_or(true, |s| {
                let needle = s.to_lowercase();
                p.name.to_lowercase().contains(&needle)
                    || p.description.as_deref().is_some_and(|d| d.to_lowercase().contains(&needle))
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self { Self { page: page.max(1), limit: limit.max(1) } }
    pub fn offset(&self) -> u64 { u64::from(self.page - 1) * u64::from(self.limit) }
}

impl Default for PageRequest {
    fn default() -> Self { Self::new(1, 20) }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub request: PageRequest,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 { self.total.div_ceil(u64::from(self.request.limit)) }

    /// Slices an already-sorted full result set.
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as u64;
        let items = all.into_iter().skip(request.offset() as usize).take(request.limit as usize).collect();
        Self { items, total, request }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<Uuid>,
}

/// Contact fields joined onto an order for notifications.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CustomerContact {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<Address>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderItemDetail {
    #[serde(flatten)]
    pub item: OrderLineItem,
    pub product_name: Option<String>,
    pub product_description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub customer: CustomerContact,
    pub items: Vec<OrderItemDetail>,
}

/// One order line with its parent order's status, for read-side rollups.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderItemFact {
    pub product: Option<Product>,
    pub quantity: Quantity,
    pub item_total: Decimal,
    pub order_status: OrderStatus,
    pub order_created_at: DateTime<Utc>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_products(&self, filter: &ProductFilter, page: PageRequest) -> Result<Page<Product>>;

    /// `None` when the product is absent or not available.
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;

    async fn get_category_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    async fn list_menu_categories(&self) -> Result<Vec<Category>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes the header and all lines, or nothing.
    async fn insert_order(&self, order: &Order, items: &[OrderLineItem]) -> Result<()>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;

    async fn order_details(&self, id: Uuid) -> Result<Option<OrderDetails>>;

    /// Persists status and milestones only if the stored status still equals `from`.
    /// Fails with [`crate::Error::Conflict`] otherwise.
    async fn save_transition(&self, order: &Order, from: OrderStatus) -> Result<()>;

    /// Newest first.
    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> Result<Page<Order>>;

    async fn all_orders(&self) -> Result<Vec<Order>>;

    /// Lines of orders in `statuses`, or of every order when `None`.
    async fn order_item_facts(&self, statuses: Option<&[OrderStatus]>) -> Result<Vec<OrderItemFact>>;

    /// Records that the `kind` message is going out for the order.
    /// `false` when it was already recorded.
    async fn claim_notification(&self, order_id: Uuid, kind: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Drops a claim whose message was not delivered.
    async fn release_notification(&self, order_id: Uuid, kind: &str) -> Result<()>;
}

/// Remote per-user bag.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn fetch_cart(&self, user_id: Uuid) -> Result<Vec<CartLineItem>>;

    /// Upserts every line keyed by (user, product) and drops lines not in `items`.
    async fn replace_cart(&self, user_id: Uuid, items: &[CartLineItem]) -> Result<()>;

    async fn clear_cart(&self, user_id: Uuid) -> Result<()> { self.replace_cart(user_id, &[]).await }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>>;

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile>;

    async fn list_wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>>;

    /// Idempotent per (user, product).
    async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistEntry>;

    async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool>;

    /// Returns whether the product is in the wishlist afterwards.
    async fn toggle_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
        if self.remove_from_wishlist(user_id, product_id).await? {
            Ok(false)
        } else {
            self.add_to_wishlist(user_id, product_id).await?;
            Ok(true)
        }
    }
}
