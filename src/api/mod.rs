//! HTTP surface.
//!
//! Public catalog reads, the signed-in shopper's bag, wishlist, profile and
//! orders, the back-office admin routes and the order status webhook.

mod account;
mod cache;
mod catalog;
mod error;
mod extract;
mod orders;
mod webhook;

pub use cache::{ResponseCache, BESTSELLERS_TTL, PRODUCTS_TTL};
pub use error::{ApiError, ApiResult};
pub use extract::ApiJson;

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::TokenVerifier;
use crate::bus::EventPublisher;
use crate::cart::MergePolicy;
use crate::notify::NotificationDispatcher;
use crate::store::{AccountStore, CartStore, CatalogStore, OrderStore, Page, ProductFilter};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogStore>,
    pub orders: Arc<dyn OrderStore>,
    pub carts: Arc<dyn CartStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub verifier: TokenVerifier,
    pub publisher: Arc<dyn EventPublisher>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub webhook_secret: Option<String>,
    pub merge_policy: MergePolicy,
    pub cache: ResponseCache,
}

impl AppState {
    /// Wires every store seam to the same backing store.
    pub fn new<S>(store: Arc<S>, verifier: TokenVerifier, publisher: Arc<dyn EventPublisher>, dispatcher: Arc<NotificationDispatcher>) -> Self
    where
        S: CatalogStore + OrderStore + CartStore + AccountStore + 'static,
    {
        Self {
            catalog: store.clone(),
            orders: store.clone(),
            carts: store.clone(),
            accounts: store,
            verifier,
            publisher,
            dispatcher,
            webhook_secret: None,
            merge_policy: MergePolicy::default(),
            cache: ResponseCache::new(),
        }
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret;
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_count: u64,
    pub limit: u32,
}

impl<T> From<&Page<T>> for Pagination {
    fn from(page: &Page<T>) -> Self {
        Self {
            current_page: page.request.page,
            total_pages: page.total_pages(),
            total_count: page.total,
            limit: page.request.limit,
        }
    }
}

/// Paginated list envelope.
#[derive(Serialize)]
pub struct Listing<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub pagination: Pagination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<ProductFilter>,
    pub timestamp: DateTime<Utc>,
}

impl<T> Listing<T> {
    pub fn new(page: Page<T>, filters: Option<ProductFilter>) -> Self {
        let pagination = Pagination::from(&page);
        Self { success: true, data: page.items, pagination, filters, timestamp: Utc::now() }
    }
}

/// Single-value envelope.
#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> { Json(Envelope { success: true, data }) }

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "storefront" }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/products", get(catalog::list_products))
        .route("/api/products/category/:slug", get(catalog::list_category_products))
        .route("/api/products/:id", get(catalog::get_product))
        .route("/api/bestsellers", get(catalog::bestsellers))
        .route("/api/categories", get(catalog::list_categories))
        .route("/api/bag", get(account::get_bag).put(account::replace_bag).delete(account::clear_bag))
        .route("/api/bag/merge", post(account::merge_bag))
        .route("/api/wishlist", get(account::list_wishlist))
        .route("/api/wishlist/:product_id", post(account::toggle_wishlist))
        .route("/api/profile", get(account::get_profile).put(account::update_profile))
        .route("/api/orders", get(orders::list_my_orders).post(orders::create_order))
        .route("/api/admin/orders", get(orders::admin_list_orders))
        .route("/api/admin/orders/:id/status", patch(orders::admin_update_status))
        .route("/api/admin/dashboard", get(orders::admin_dashboard))
        .route("/webhooks/order-status", post(webhook::order_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
