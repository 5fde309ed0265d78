use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    AccountStore, CartStore, CatalogStore, CustomerContact, OrderDetails, OrderFilter, OrderItemDetail,
    OrderItemFact, OrderStore, Page, PageRequest, ProductFilter,
};
use crate::domain::aggregates::{
    Address, CartLineItem, Category, Customization, Milestones, Order, OrderLineItem, OrderStatus, Product,
    ProductSnapshot, Profile, WishlistEntry,
};
use crate::domain::value_objects::{Quantity, Slug};
use crate::{Error, Result};

/// Postgres-backed store. Cheap to clone.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| Error::Store(e.to_string()))
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    images: Vec<String>,
    brand_id: Option<Uuid>,
    category_id: Uuid,
    is_available: bool,
    price: Decimal,
    promo_price: Option<Decimal>,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id, name: r.name, description: r.description, images: r.images, brand_id: r.brand_id,
            category_id: r.category_id, is_available: r.is_available, price: r.price, promo_price: r.promo_price,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    images: Vec<String>,
    show_in_menu: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<CategoryRow> for Category {
    type Error = Error;
    fn try_from(r: CategoryRow) -> Result<Self> {
        let slug = Slug::new(r.slug).map_err(|e| Error::Store(format!("category {}: {e}", r.id)))?;
        Ok(Category { id: r.id, name: r.name, slug, description: r.description, images: r.images, show_in_menu: r.show_in_menu, created_at: r.created_at })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    total_amount: Decimal,
    notes: Option<String>,
    status: String,
    confirmed_at: Option<DateTime<Utc>>,
    ready_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = Error;
    fn try_from(r: OrderRow) -> Result<Self> {
        let status = parse_status(&r.status)?;
        let milestones = Milestones { confirmed_at: r.confirmed_at, ready_at: r.ready_at, delivered_at: r.delivered_at, completed_at: r.completed_at };
        Ok(Order::restore(r.id, r.user_id, r.total_amount, r.notes, status, milestones, r.created_at))
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Option<Uuid>,
    quantity: i32,
    base_price: Decimal,
    customization: Option<Json<Customization>>,
    customization_fee: Decimal,
    item_total: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderItemRow> for OrderLineItem {
    type Error = Error;
    fn try_from(r: OrderItemRow) -> Result<Self> {
        Ok(OrderLineItem {
            id: r.id, order_id: r.order_id, product_id: r.product_id, quantity: quantity(r.quantity)?,
            base_price: r.base_price, customization: r.customization.map(|j| j.0),
            customization_fee: r.customization_fee, item_total: r.item_total, created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BagRow {
    product_id: Uuid,
    quantity: i32,
    product_snapshot: Json<ProductSnapshot>,
    added_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    full_name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    address: Option<Json<Address>>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(r: ProfileRow) -> Self {
        Profile { id: r.id, full_name: r.full_name, phone: r.phone, email: r.email, address: r.address.map(|a| a.0), updated_at: r.updated_at }
    }
}

#[derive(sqlx::FromRow)]
struct WishlistRow {
    user_id: Uuid,
    product_id: Uuid,
    created_at: DateTime<Utc>,
}

fn parse_status(s: &str) -> Result<OrderStatus> {
    s.parse().map_err(|e: crate::domain::aggregates::OrderError| Error::Store(e.to_string()))
}

fn quantity(q: i32) -> Result<Quantity> {
    u32::try_from(q).ok().and_then(|q| Quantity::new(q).ok()).ok_or_else(|| Error::Store(format!("invalid stored quantity {q}")))
}

fn quantity_column(q: Quantity) -> i32 { i32::try_from(q.value()).unwrap_or(i32::MAX) }

fn like_pattern(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    if let Some(slug) = &filter.category { qb.push(" AND c.slug = ").push_bind(slug.clone()); }
    if let Some(brand) = filter.brand { qb.push(" AND p.brand_id = ").push_bind(brand); }
    if let Some(available) = filter.available { qb.push(" AND p.is_available = ").push_bind(available); }
    if let Some(min) = filter.min_price { qb.push(" AND p.price >= ").push_bind(min); }
    if let Some(max) = filter.max_price { qb.push(" AND p.price <= ").push_bind(max); }
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        qb.push(" AND (p.name ILIKE ").push_bind(pattern.clone())
            .push(" OR p.description ILIKE ").push_bind(pattern).push(")");
    }
}

fn push_order_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    if let Some(status) = filter.status { qb.push(" AND status = ").push_bind(status.as_str()); }
    if let Some(user) = filter.user_id { qb.push(" AND user_id = ").push_bind(user); }
}

const PRODUCT_FROM: &str = " FROM products p LEFT JOIN categories c ON c.id = p.category_id WHERE TRUE";

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_products(&self, filter: &ProductFilter, page: PageRequest) -> Result<Page<Product>> {
        let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*){PRODUCT_FROM}"));
        push_product_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT p.*{PRODUCT_FROM}"));
        push_product_filters(&mut qb, filter);
        qb.push(format!(" ORDER BY {} {}, p.id", filter.sort_by.column(), filter.sort_order.keyword()));
        qb.push(" LIMIT ").push_bind(i64::from(page.limit))
            .push(" OFFSET ").push_bind(page.offset() as i64);
        let rows: Vec<ProductRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page { items: rows.into_iter().map(Product::from).collect(), total: total.max(0) as u64, request: page })
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1 AND is_available = TRUE")
            .bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Product::from))
    }

    async fn get_category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE slug = $1")
            .bind(slug).fetch_optional(&self.pool).await?
            .map(Category::try_from).transpose()
    }

    async fn list_menu_categories(&self) -> Result<Vec<Category>> {
        sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE show_in_menu = TRUE ORDER BY name")
            .fetch_all(&self.pool).await?
            .into_iter().map(Category::try_from).collect()
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: &Order, items: &[OrderLineItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO orders (id, user_id, total_amount, notes, status, confirmed_at, ready_at, delivered_at, completed_at, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(order.id).bind(order.user_id).bind(order.total_amount).bind(&order.notes).bind(order.status().as_str())
            .bind(order.confirmed_at()).bind(order.ready_at()).bind(order.delivered_at()).bind(order.completed_at())
            .bind(order.created_at)
            .execute(&mut *tx).await?;
        for item in items {
            sqlx::query("INSERT INTO order_items (id, order_id, product_id, quantity, base_price, customization, customization_fee, item_total, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
                .bind(item.id).bind(item.order_id).bind(item.product_id).bind(quantity_column(item.quantity))
                .bind(item.base_price).bind(item.customization.as_ref().map(Json)).bind(item.customization_fee)
                .bind(item.item_total).bind(item.created_at)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn order_details(&self, id: Uuid) -> Result<Option<OrderDetails>> {
        #[derive(sqlx::FromRow)]
        struct DetailRow {
            #[sqlx(flatten)]
            order: OrderRow,
            customer_name: Option<String>,
            customer_phone: Option<String>,
            customer_email: Option<String>,
            customer_address: Option<Json<Address>>,
        }
        #[derive(sqlx::FromRow)]
        struct ItemDetailRow {
            #[sqlx(flatten)]
            item: OrderItemRow,
            product_name: Option<String>,
            product_description: Option<String>,
        }

        let Some(row) = sqlx::query_as::<_, DetailRow>("SELECT * FROM orders_with_user_details WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await? else { return Ok(None) };
        let items = sqlx::query_as::<_, ItemDetailRow>(
            "SELECT oi.*, p.name AS product_name, p.description AS product_description FROM order_items oi LEFT JOIN products p ON p.id = oi.product_id WHERE oi.order_id = $1 ORDER BY oi.created_at, oi.id",
        ).bind(id).fetch_all(&self.pool).await?;

        let customer = CustomerContact {
            name: row.customer_name,
            phone: row.customer_phone,
            email: row.customer_email,
            address: row.customer_address.map(|a| a.0),
        };
        let items = items.into_iter().map(|r| Ok(OrderItemDetail {
            item: OrderLineItem::try_from(r.item)?,
            product_name: r.product_name,
            product_description: r.product_description,
        })).collect::<Result<Vec<_>>>()?;
        Ok(Some(OrderDetails { order: Order::try_from(row.order)?, customer, items }))
    }

    async fn save_transition(&self, order: &Order, from: OrderStatus) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, confirmed_at = $3, ready_at = $4, delivered_at = $5, completed_at = $6 WHERE id = $1 AND status = $7")
            .bind(order.id).bind(order.status().as_str())
            .bind(order.confirmed_at()).bind(order.ready_at()).bind(order.delivered_at()).bind(order.completed_at())
            .bind(from.as_str())
            .execute(&self.pool).await?;
        if result.rows_affected() == 1 { return Ok(()); }
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
            .bind(order.id).fetch_one(&self.pool).await?;
        Err(if exists { Error::Conflict } else { Error::OrderNotFound(order.id) })
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders WHERE TRUE");
        push_order_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM orders WHERE TRUE");
        push_order_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id LIMIT ").push_bind(i64::from(page.limit))
            .push(" OFFSET ").push_bind(page.offset() as i64);
        let rows: Vec<OrderRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let items = rows.into_iter().map(Order::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Page { items, total: total.max(0) as u64, request: page })
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders ORDER BY created_at")
            .fetch_all(&self.pool).await?
            .into_iter().map(Order::try_from).collect()
    }

    async fn claim_notification(&self, order_id: Uuid, kind: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("INSERT INTO order_notifications (order_id, kind, sent_at) VALUES ($1, $2, $3) ON CONFLICT (order_id, kind) DO NOTHING")
            .bind(order_id).bind(kind).bind(at)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_notification(&self, order_id: Uuid, kind: &str) -> Result<()> {
        sqlx::query("DELETE FROM order_notifications WHERE order_id = $1 AND kind = $2")
            .bind(order_id).bind(kind)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn order_item_facts(&self, statuses: Option<&[OrderStatus]>) -> Result<Vec<OrderItemFact>> {
        #[derive(sqlx::FromRow)]
        struct FactRow {
            product_id: Option<Uuid>,
            quantity: i32,
            item_total: Decimal,
            status: String,
            order_created_at: DateTime<Utc>,
        }

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT oi.product_id, oi.quantity, oi.item_total, o.status, o.created_at AS order_created_at FROM order_items oi JOIN orders o ON o.id = oi.order_id",
        );
        if let Some(statuses) = statuses {
            let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            qb.push(" WHERE o.status = ANY(").push_bind(names).push(")");
        }
        let rows: Vec<FactRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut ids: Vec<Uuid> = rows.iter().filter_map(|r| r.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let products: HashMap<Uuid, Product> = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(&ids).fetch_all(&self.pool).await?
            .into_iter().map(|r| (r.id, Product::from(r))).collect();

        rows.into_iter().map(|r| Ok(OrderItemFact {
            product: r.product_id.and_then(|id| products.get(&id).cloned()),
            quantity: quantity(r.quantity)?,
            item_total: r.item_total,
            order_status: parse_status(&r.status)?,
            order_created_at: r.order_created_at,
        })).collect()
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn fetch_cart(&self, user_id: Uuid) -> Result<Vec<CartLineItem>> {
        sqlx::query_as::<_, BagRow>("SELECT product_id, quantity, product_snapshot, added_at, updated_at FROM shopping_bags WHERE user_id = $1 ORDER BY added_at, product_id")
            .bind(user_id).fetch_all(&self.pool).await?
            .into_iter()
            .map(|r| Ok(CartLineItem { product_id: r.product_id, quantity: quantity(r.quantity)?, product: r.product_snapshot.0, added_at: r.added_at, updated_at: r.updated_at }))
            .collect()
    }

    async fn replace_cart(&self, user_id: Uuid, items: &[CartLineItem]) -> Result<()> {
        let keep: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM shopping_bags WHERE user_id = $1 AND NOT (product_id = ANY($2))")
            .bind(user_id).bind(&keep).execute(&mut *tx).await?;
        for item in items {
            sqlx::query("INSERT INTO shopping_bags (user_id, product_id, quantity, product_snapshot, added_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity, product_snapshot = EXCLUDED.product_snapshot, updated_at = EXCLUDED.updated_at")
                .bind(user_id).bind(item.product_id).bind(quantity_column(item.quantity)).bind(Json(&item.product))
                .bind(item.added_at).bind(item.updated_at)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM shopping_bags WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE id = $1")
            .bind(user_id).fetch_optional(&self.pool).await?;
        Ok(row.map(Profile::from))
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile> {
        let row = sqlx::query_as::<_, ProfileRow>("INSERT INTO profiles (id, full_name, phone, email, address, updated_at) VALUES ($1, $2, $3, $4, $5, NOW()) ON CONFLICT (id) DO UPDATE SET full_name = EXCLUDED.full_name, phone = EXCLUDED.phone, email = EXCLUDED.email, address = EXCLUDED.address, updated_at = NOW() RETURNING *")
            .bind(profile.id).bind(&profile.full_name).bind(&profile.phone).bind(&profile.email)
            .bind(profile.address.as_ref().map(Json))
            .fetch_one(&self.pool).await?;
        Ok(row.into())
    }

    async fn list_wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>> {
        let rows = sqlx::query_as::<_, WishlistRow>("SELECT user_id, product_id, created_at FROM wishlist WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| WishlistEntry { user_id: r.user_id, product_id: r.product_id, created_at: r.created_at }).collect())
    }

    async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistEntry> {
        let r = sqlx::query_as::<_, WishlistRow>("INSERT INTO wishlist (user_id, product_id, created_at) VALUES ($1, $2, NOW()) ON CONFLICT (user_id, product_id) DO UPDATE SET user_id = EXCLUDED.user_id RETURNING user_id, product_id, created_at")
            .bind(user_id).bind(product_id).fetch_one(&self.pool).await?;
        Ok(WishlistEntry { user_id: r.user_id, product_id: r.product_id, created_at: r.created_at })
    }

    async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM wishlist WHERE user_id = $1 AND product_id = $2")
            .bind(user_id).bind(product_id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
