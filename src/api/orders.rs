use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::extract::{ApiJson, PageQuery};
use super::{ok, AppState, Listing};
use crate::analytics::dashboard_stats;
use crate::auth::Session;
use crate::domain::aggregates::OrderStatus;
use crate::orders::{place_order, transition_status, CreateOrderRequest};
use crate::store::OrderFilter;
use crate::Error;

pub async fn create_order(State(state): State<AppState>, session: Session, ApiJson(request): ApiJson<CreateOrderRequest>) -> ApiResult<impl IntoResponse> {
    let placed = place_order(state.orders.as_ref(), &session, request, Utc::now()).await?;
    Ok((StatusCode::CREATED, ok(placed)))
}

pub async fn list_my_orders(State(state): State<AppState>, session: Session, Query(query): Query<PageQuery>) -> ApiResult<impl IntoResponse> {
    let user = session.require_user()?;
    let filter = OrderFilter { status: None, user_id: Some(user) };
    let page = state.orders.list_orders(&filter, query.page_request()?).await?;
    Ok(Json(Listing::new(page, None)))
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminOrdersQuery {
    status: Option<String>,
    #[serde(flatten)]
    page: PageQuery,
}

fn parse_status(raw: &str) -> ApiResult<OrderStatus> {
    raw.trim().parse().map_err(|_| ApiError::bad_request(format!("unknown order status: {raw}")))
}

pub async fn admin_list_orders(State(state): State<AppState>, session: Session, Query(query): Query<AdminOrdersQuery>) -> ApiResult<impl IntoResponse> {
    session.require_admin()?;
    let status = query.status.as_deref().filter(|s| !s.trim().is_empty()).map(parse_status).transpose()?;
    let filter = OrderFilter { status, user_id: None };
    let page = state.orders.list_orders(&filter, query.page.page_request()?).await?;
    Ok(Json(Listing::new(page, None)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn admin_update_status(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    session.require_admin()?;
    let id: Uuid = id.parse().map_err(|_| Error::OrderNotFound(Uuid::nil()))?;
    let to = parse_status(&request.status)?;
    let order = transition_status(state.orders.as_ref(), state.publisher.as_ref(), id, to, Utc::now()).await?;
    Ok(ok(order))
}

pub async fn admin_dashboard(State(state): State<AppState>, session: Session) -> ApiResult<impl IntoResponse> {
    session.require_admin()?;
    let orders = state.orders.all_orders().await?;
    let facts = state.orders.order_item_facts(None).await?;
    Ok(ok(dashboard_stats(&orders, &facts, Utc::now().date_naive())))
}
