//! Request extractors and query parameter parsing.

use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;

use axum::{
    extract::{FromRequest, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;

use super::{error::ApiError, AppState};
use crate::auth::Session;
use crate::store::PageRequest;
use crate::Error;

#[axum::async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| Error::Unauthenticated)?),
            None => None,
        };
        Ok(state.verifier.session_from_header(header)?)
    }
}

/// `axum::Json` with rejections rendered in the API error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Parses an optional numeric parameter, rejecting values outside `range`.
pub fn parse_bounded<T>(name: &str, raw: Option<&str>, default: T, range: RangeInclusive<T>) -> Result<T, ApiError>
where
    T: FromStr + PartialOrd + Display + Copy,
{
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else { return Ok(default) };
    let value: T = raw.parse().map_err(|_| ApiError::bad_request(format!("{name} must be a number")))?;
    if !range.contains(&value) {
        return Err(ApiError::bad_request(format!("{name} must be between {} and {}", range.start(), range.end())));
    }
    Ok(value)
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    pub fn page_request(&self) -> Result<PageRequest, ApiError> {
        let page = parse_bounded("page", self.page.as_deref(), 1, 1..=u32::MAX)?;
        let limit = parse_bounded("limit", self.limit.as_deref(), DEFAULT_PAGE_LIMIT, 1..=MAX_PAGE_LIMIT)?;
        Ok(PageRequest::new(page, limit))
    }
}
