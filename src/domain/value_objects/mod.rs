//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// URL-safe category slug
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    pub fn new(value: impl Into<String>) -> Result<Self, SlugError> {
        let value = value.into().trim().to_lowercase();
        if value.is_empty() { return Err(SlugError::Empty); }
        if value.len() > 100 { return Err(SlugError::TooLong); }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(SlugError::InvalidCharacter);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self { slug.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    #[error("slug empty")]
    Empty,
    #[error("slug too long")]
    TooLong,
    #[error("slug may only contain lowercase letters, digits and '-'")]
    InvalidCharacter,
}

/// Line quantity, always at least one
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);

    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }

    /// `None` for zero or negative requests, which callers treat as removal.
    pub fn from_signed(value: i64) -> Option<Self> {
        u32::try_from(value).ok().filter(|v| *v > 0).map(Self)
    }

    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }
    pub fn as_decimal(&self) -> Decimal { Decimal::from(self.0) }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self { q.0 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity must be at least 1")]
    Zero,
}

/// Destination number for outbound messages: digits with an optional leading '+'.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Strips every character except digits and a leading '+'.
    pub fn normalize(raw: &str) -> Result<Self, PhoneError> {
        let trimmed = raw.trim();
        let mut out = String::with_capacity(trimmed.len());
        if trimmed.starts_with('+') { out.push('+'); }
        out.extend(trimmed.chars().filter(char::is_ascii_digit));
        if out.trim_start_matches('+').is_empty() { return Err(PhoneError::NoDigits); }
        Ok(Self(out))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    #[error("phone number has no digits")]
    NoDigits,
}

/// Human-facing order reference: first 8 characters of the id, uppercased.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderRef(String);

impl OrderRef {
    pub fn from_id(id: &Uuid) -> Self {
        let s = id.to_string();
        Self(s.chars().take(8).collect::<String>().to_uppercase())
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// Renders an amount with at most two decimals and no trailing zeros ("300", "12.5").
pub fn format_amount(amount: Decimal) -> String {
    amount.round_dp(2).normalize().to_string()
}
