use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::error::{ApiError, ApiResult};
use super::extract::ApiJson;
use super::AppState;
use crate::notify::OrderWebhookPayload;
use crate::Error;

pub const SECRET_HEADER: &str = "x-webhook-secret";

/// Database webhook for `orders` updates. Answers `{success, sent}`.
pub async fn order_status(State(state): State<AppState>, headers: HeaderMap, ApiJson(body): ApiJson<Value>) -> ApiResult<Json<Value>> {
    if let Some(secret) = &state.webhook_secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(secret.as_str()) {
            warn!("Order webhook called without a valid secret");
            return Err(Error::Unauthenticated.into());
        }
    }
    let payload: OrderWebhookPayload = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("malformed webhook payload: {e}")))?;
    let Some(change) = payload.status_change() else {
        debug!(kind = %payload.kind, table = %payload.table, "Ignoring webhook event");
        return Ok(Json(json!({ "success": true, "sent": false })));
    };
    let outcome = state.dispatcher.handle(&change).await?;
    Ok(Json(json!({ "success": true, "sent": outcome.is_sent() })))
}
