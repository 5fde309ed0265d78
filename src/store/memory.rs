use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AccountStore, CartStore, CatalogStore, CustomerContact, OrderDetails, OrderFilter, OrderItemDetail,
    OrderItemFact, OrderStore, Page, PageRequest, ProductFilter, ProductSort, SortOrder,
};
use crate::domain::aggregates::{
    CartLineItem, Category, Order, OrderLineItem, OrderStatus, Product, Profile, WishlistEntry,
};
use crate::{Error, Result};

#[derive(Default)]
struct Tables {
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    profiles: HashMap<Uuid, Profile>,
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderLineItem>,
    bags: HashMap<Uuid, Vec<CartLineItem>>,
    wishlist: Vec<WishlistEntry>,
    notifications: HashSet<(Uuid, String)>,
}

/// In-process store with the same semantics as [`super::PgStore`].
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_writes: RwLock<bool>,
    fail_reads: RwLock<bool>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn insert_category(&self, category: Category) { self.tables.write().await.categories.insert(category.id, category); }
    pub async fn insert_product(&self, product: Product) { self.tables.write().await.products.insert(product.id, product); }

    /// Makes every subsequent write fail, to exercise error paths.
    pub async fn fail_writes(&self, fail: bool) { *self.fail_writes.write().await = fail; }

    /// Makes remote bag and order detail reads fail.
    pub async fn fail_reads(&self, fail: bool) { *self.fail_reads.write().await = fail; }

    async fn check_readable(&self) -> Result<()> {
        if *self.fail_reads.read().await { return Err(Error::Store("reads disabled".into())); }
        Ok(())
    }

    async fn check_writable(&self) -> Result<()> {
        if *self.fail_writes.read().await { return Err(Error::Store("writes disabled".into())); }
        Ok(())
    }

    pub async fn order_item_count(&self, order_id: Uuid) -> usize {
        self.tables.read().await.order_items.iter().filter(|i| i.order_id == order_id).count()
    }
}

fn sort_products(products: &mut [Product], by: ProductSort, order: SortOrder) {
    products.sort_by(|a, b| {
        let ord = match by {
            ProductSort::CreatedAt => a.created_at.cmp(&b.created_at),
            ProductSort::Price => a.price.cmp(&b.price),
            ProductSort::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        };
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_products(&self, filter: &ProductFilter, page: PageRequest) -> Result<Page<Product>> {
        let t = self.tables.read().await;
        let category_id = match &filter.category {
            Some(slug) => match t.categories.values().find(|c| c.slug.as_str() == slug) {
                Some(c) => Some(c.id),
                None => return Ok(Page::from_sorted(vec![], page)),
            },
            None => None,
        };
        let mut all: Vec<Product> = t.products.values()
            .filter(|p| category_id.map_or(true, |c| p.category_id == c))
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        sort_products(&mut all, filter.sort_by, filter.sort_order);
        Ok(Page::from_sorted(all, page))
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).filter(|p| p.is_available).cloned())
    }

    async fn get_category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        Ok(self.tables.read().await.categories.values().find(|c| c.slug.as_str() == slug).cloned())
    }

    async fn list_menu_categories(&self) -> Result<Vec<Category>> {
        let mut out: Vec<Category> = self.tables.read().await.categories.values().filter(|c| c.show_in_menu).cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order, items: &[OrderLineItem]) -> Result<()> {
        self.check_writable().await?;
        let mut t = self.tables.write().await;
        t.orders.insert(order.id, order.clone());
        t.order_items.extend_from_slice(items);
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn order_details(&self, id: Uuid) -> Result<Option<OrderDetails>> {
        self.check_readable().await?;
        let t = self.tables.read().await;
        let Some(order) = t.orders.get(&id).cloned() else { return Ok(None) };
        let customer = t.profiles.get(&order.user_id).map(|p| CustomerContact {
            name: p.full_name.clone(),
            phone: p.phone.clone(),
            email: p.email.clone(),
            address: p.address.clone(),
        }).unwrap_or_default();
        let items = t.order_items.iter().filter(|i| i.order_id == id).map(|i| {
            let product = i.product_id.and_then(|pid| t.products.get(&pid));
            OrderItemDetail {
                item: i.clone(),
                product_name: product.map(|p| p.name.clone()),
                product_description: product.and_then(|p| p.description.clone()),
            }
        }).collect();
        Ok(Some(OrderDetails { order, customer, items }))
    }

    async fn save_transition(&self, order: &Order, from: OrderStatus) -> Result<()> {
        self.check_writable().await?;
        let mut t = self.tables.write().await;
        let stored = t.orders.get_mut(&order.id).ok_or(Error::OrderNotFound(order.id))?;
        if stored.status() != from { return Err(Error::Conflict); }
        *stored = Order::restore(stored.id, stored.user_id, stored.total_amount, stored.notes.clone(), order.status(), order.milestones(), stored.created_at);
        Ok(())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let t = self.tables.read().await;
        let mut all: Vec<Order> = t.orders.values()
            .filter(|o| filter.status.map_or(true, |s| o.status() == s))
            .filter(|o| filter.user_id.map_or(true, |u| o.user_id == u))
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::from_sorted(all, page))
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        Ok(self.tables.read().await.orders.values().cloned().collect())
    }

    async fn claim_notification(&self, order_id: Uuid, kind: &str, _at: DateTime<Utc>) -> Result<bool> {
        self.check_writable().await?;
        Ok(self.tables.write().await.notifications.insert((order_id, kind.to_string())))
    }

    async fn release_notification(&self, order_id: Uuid, kind: &str) -> Result<()> {
        self.tables.write().await.notifications.remove(&(order_id, kind.to_string()));
        Ok(())
    }

    async fn order_item_facts(&self, statuses: Option<&[OrderStatus]>) -> Result<Vec<OrderItemFact>> {
        let t = self.tables.read().await;
        Ok(t.order_items.iter().filter_map(|i| {
            let order = t.orders.get(&i.order_id)?;
            if statuses.is_some_and(|s| !s.contains(&order.status())) { return None; }
            Some(OrderItemFact {
                product: i.product_id.and_then(|pid| t.products.get(&pid).cloned()),
                quantity: i.quantity,
                item_total: i.item_total,
                order_status: order.status(),
                order_created_at: order.created_at,
            })
        }).collect())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn fetch_cart(&self, user_id: Uuid) -> Result<Vec<CartLineItem>> {
        self.check_readable().await?;
        Ok(self.tables.read().await.bags.get(&user_id).cloned().unwrap_or_default())
    }

    async fn replace_cart(&self, user_id: Uuid, items: &[CartLineItem]) -> Result<()> {
        self.check_writable().await?;
        self.tables.write().await.bags.insert(user_id, items.to_vec());
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        Ok(self.tables.read().await.profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile> {
        self.check_writable().await?;
        let mut stored = profile.clone();
        stored.updated_at = Utc::now();
        self.tables.write().await.profiles.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn list_wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>> {
        let mut out: Vec<WishlistEntry> = self.tables.read().await.wishlist.iter().filter(|w| w.user_id == user_id).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistEntry> {
        self.check_writable().await?;
        let mut t = self.tables.write().await;
        if let Some(existing) = t.wishlist.iter().find(|w| w.user_id == user_id && w.product_id == product_id) {
            return Ok(existing.clone());
        }
        let entry = WishlistEntry { user_id, product_id, created_at: Utc::now() };
        t.wishlist.push(entry.clone());
        Ok(entry)
    }

    async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
        self.check_writable().await?;
        let mut t = self.tables.write().await;
        let before = t.wishlist.len();
        t.wishlist.retain(|w| !(w.user_id == user_id && w.product_id == product_id));
        Ok(t.wishlist.len() != before)
    }
}
