use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::notify::DispatchError;
use crate::Error;

/// Error body shared by every endpoint: `{success: false, error, message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn status(&self) -> StatusCode { self.status }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let (status, code) = match &e {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Error::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Error::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            Error::ProductNotFound | Error::CategoryNotFound | Error::OrderNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::IllegalTransition { .. } | Error::Conflict => (StatusCode::CONFLICT, "conflict"),
            Error::Database(_) | Error::Store(_) | Error::Storage(_) | Error::Bus(_) => {
                error!(error = %e, "Request failed");
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Something went wrong");
            }
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "notification_failed", e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        error!(error = %e, "Response serialization failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Something went wrong")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self { Self::bad_request(rejection.body_text()) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "error": self.code, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
