use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::cache::{cache_control, BESTSELLERS_TTL, PRODUCTS_TTL};
use super::error::{ApiError, ApiResult};
use super::extract::{parse_bounded, PageQuery};
use super::{ok, AppState, Listing};
use crate::analytics::{bestsellers as rank_bestsellers, BestSellerProjection, SOLD_STATUSES};
use crate::store::{PageRequest, ProductFilter, ProductSort, SortOrder};
use crate::Error;

pub const DEFAULT_BESTSELLERS: usize = 10;
pub const MAX_BESTSELLERS: usize = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQuery {
    category: Option<String>,
    brand: Option<String>,
    search: Option<String>,
    min_price: Option<String>,
    max_price: Option<String>,
    available: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

fn non_empty(raw: &Option<String>) -> Option<&str> { raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) }

fn parse_price(name: &str, raw: &Option<String>) -> ApiResult<Option<Decimal>> {
    non_empty(raw)
        .map(|s| s.parse::<Decimal>().map_err(|_| ApiError::bad_request(format!("{name} must be a number"))))
        .transpose()
}

impl ListingQuery {
    fn parse(&self) -> ApiResult<(ProductFilter, PageRequest)> {
        let brand = non_empty(&self.brand)
            .map(|s| s.parse::<Uuid>().map_err(|_| ApiError::bad_request("brand must be a brand id")))
            .transpose()?;
        let available = match non_empty(&self.available) {
            None => Some(true),
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(_) => return Err(ApiError::bad_request("available must be true or false")),
        };
        let sort_by = match non_empty(&self.sort_by) {
            None => ProductSort::default(),
            Some(s) => ProductSort::parse(s).ok_or_else(|| ApiError::bad_request("sortBy must be one of created_at, price, name"))?,
        };
        let sort_order = match non_empty(&self.sort_order) {
            None => SortOrder::default(),
            Some(s) => SortOrder::parse(s).ok_or_else(|| ApiError::bad_request("sortOrder must be asc or desc"))?,
        };
        let filter = ProductFilter {
            category: non_empty(&self.category).map(str::to_string),
            brand,
            search: non_empty(&self.search).map(str::to_string),
            min_price: parse_price("minPrice", &self.min_price)?,
            max_price: parse_price("maxPrice", &self.max_price)?,
            available,
            sort_by,
            sort_order,
        };
        let page = PageQuery { page: self.page.clone(), limit: self.limit.clone() }.page_request()?;
        Ok((filter, page))
    }
}

fn cached_response(value: Value, ttl: std::time::Duration) -> Response {
    ([(header::CACHE_CONTROL, cache_control(ttl))], Json(value)).into_response()
}

async fn product_listing(state: &AppState, filter: ProductFilter, page: PageRequest) -> ApiResult<Response> {
    let key = format!("products:{}:{}:{}", serde_json::to_string(&filter).unwrap_or_default(), page.page, page.limit);
    let value = state.cache.products(key, move || async move {
        let results = state.catalog.list_products(&filter, page).await?;
        Ok(serde_json::to_value(Listing::new(results, Some(filter)))?)
    }).await?;
    Ok(cached_response(value, PRODUCTS_TTL))
}

pub async fn list_products(State(state): State<AppState>, Query(query): Query<ListingQuery>) -> ApiResult<Response> {
    let (filter, page) = query.parse()?;
    product_listing(&state, filter, page).await
}

pub async fn list_category_products(State(state): State<AppState>, Path(slug): Path<String>, Query(query): Query<ListingQuery>) -> ApiResult<Response> {
    let (mut filter, page) = query.parse()?;
    let category = state.catalog.get_category_by_slug(&slug).await?.ok_or(Error::CategoryNotFound)?;
    filter.category = Some(category.slug.as_str().to_string());
    product_listing(&state, filter, page).await
}

pub async fn get_product(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id: Uuid = id.parse().map_err(|_| Error::ProductNotFound)?;
    let product = state.catalog.get_product(id).await?.ok_or(Error::ProductNotFound)?;
    Ok(ok(product))
}

#[derive(Serialize)]
struct Bestsellers {
    success: bool,
    count: usize,
    data: Vec<BestSellerProjection>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BestsellersQuery {
    limit: Option<String>,
}

pub async fn bestsellers(State(state): State<AppState>, Query(query): Query<BestsellersQuery>) -> ApiResult<Response> {
    let limit = parse_bounded("limit", query.limit.as_deref(), DEFAULT_BESTSELLERS, 1..=MAX_BESTSELLERS)?;
    let orders = state.orders.clone();
    let value = state.cache.bestsellers(format!("bestsellers:{limit}"), move || async move {
        let facts = orders.order_item_facts(Some(&SOLD_STATUSES[..])).await?;
        let data = rank_bestsellers(&facts, limit);
        Ok(serde_json::to_value(Bestsellers { success: true, count: data.len(), data, timestamp: Utc::now() })?)
    }).await?;
    Ok(cached_response(value, BESTSELLERS_TTL))
}

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(ok(state.catalog.list_menu_categories().await?))
}
