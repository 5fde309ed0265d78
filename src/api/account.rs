//! Signed-in shopper routes: bag mirror, wishlist and profile.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::error::ApiResult;
use super::extract::ApiJson;
use super::{ok, AppState};
use crate::auth::Session;
use crate::cart::reconcile;
use crate::domain::aggregates::{Address, Cart, CartLineItem, Profile};
use crate::domain::value_objects::PhoneNumber;
use crate::Error;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BagView {
    pub success: bool,
    pub data: Vec<CartLineItem>,
    pub total_items: u32,
    pub total_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_local: Option<bool>,
}

impl BagView {
    fn new(cart: Cart) -> Self {
        Self {
            success: true,
            total_items: cart.total_items(),
            total_price: cart.total_price(),
            data: cart.into_items(),
            write_local: None,
        }
    }
}

pub async fn get_bag(State(state): State<AppState>, session: Session) -> ApiResult<Json<BagView>> {
    let user = session.require_user()?;
    let items = state.carts.fetch_cart(user).await?;
    Ok(Json(BagView::new(Cart::from_items(items))))
}

/// Replaces the remote bag; duplicate product lines keep the first occurrence.
pub async fn replace_bag(State(state): State<AppState>, session: Session, ApiJson(items): ApiJson<Vec<CartLineItem>>) -> ApiResult<Json<BagView>> {
    let user = session.require_user()?;
    let cart = Cart::from_items(items);
    state.carts.replace_cart(user, cart.items()).await?;
    Ok(Json(BagView::new(cart)))
}

/// Reconciles a client's local bag with the remote one under the configured policy.
pub async fn merge_bag(State(state): State<AppState>, session: Session, ApiJson(items): ApiJson<Vec<CartLineItem>>) -> ApiResult<Json<BagView>> {
    let user = session.require_user()?;
    let remote = Cart::from_items(state.carts.fetch_cart(user).await?);
    let merged = reconcile(Cart::from_items(items), remote, state.merge_policy);
    if merged.write_remote {
        state.carts.replace_cart(user, merged.cart.items()).await?;
    }
    info!(user_id = %user, lines = merged.cart.line_count(), policy = ?state.merge_policy, "Bag reconciled");
    Ok(Json(BagView { write_local: Some(merged.write_local), ..BagView::new(merged.cart) }))
}

pub async fn clear_bag(State(state): State<AppState>, session: Session) -> ApiResult<impl IntoResponse> {
    let user = session.require_user()?;
    state.carts.clear_cart(user).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn list_wishlist(State(state): State<AppState>, session: Session) -> ApiResult<impl IntoResponse> {
    let user = session.require_user()?;
    Ok(ok(state.accounts.list_wishlist(user).await?))
}

#[derive(Serialize)]
pub struct WishlistToggle {
    pub in_wishlist: bool,
}

/// Adds the product to the wishlist, or removes it when already present.
pub async fn toggle_wishlist(State(state): State<AppState>, session: Session, Path(product_id): Path<String>) -> ApiResult<impl IntoResponse> {
    let user = session.require_user()?;
    let product_id: Uuid = product_id.parse().map_err(|_| Error::ProductNotFound)?;
    let listed = state.accounts.list_wishlist(user).await?.iter().any(|e| e.product_id == product_id);
    if !listed && state.catalog.get_product(product_id).await?.is_none() {
        return Err(Error::ProductNotFound.into());
    }
    let in_wishlist = state.accounts.toggle_wishlist(user, product_id).await?;
    Ok(ok(WishlistToggle { in_wishlist }))
}

pub async fn get_profile(State(state): State<AppState>, session: Session) -> ApiResult<impl IntoResponse> {
    let user = session.require_user()?;
    Ok(ok(state.accounts.get_profile(user).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    pub address: Option<Address>,
}

/// Only the fields present in the request are changed.
pub async fn update_profile(State(state): State<AppState>, session: Session, ApiJson(request): ApiJson<UpdateProfileRequest>) -> ApiResult<impl IntoResponse> {
    let user = session.require_user()?;
    request.validate().map_err(|e| Error::Validation(e.to_string()))?;
    let phone = request.phone.as_deref()
        .map(|raw| PhoneNumber::normalize(raw).map_err(|e| Error::Validation(e.to_string())))
        .transpose()?;

    let email = match &session {
        Session::User { email, .. } => email.clone(),
        Session::Anonymous => None,
    };
    let mut profile = state.accounts.get_profile(user).await?.unwrap_or(Profile {
        id: user,
        full_name: None,
        phone: None,
        email: None,
        address: None,
        updated_at: Utc::now(),
    });
    if let Some(name) = request.full_name { profile.full_name = Some(name.trim().to_string()); }
    if let Some(phone) = phone { profile.phone = Some(phone.as_str().to_string()); }
    if let Some(address) = request.address { profile.address = Some(address); }
    profile.email = email.or(profile.email);
    profile.updated_at = Utc::now();

    Ok(ok(state.accounts.upsert_profile(&profile).await?))
}
