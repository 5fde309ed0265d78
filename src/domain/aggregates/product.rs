//! Catalog aggregates: products and categories

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::Slug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub brand_id: Option<Uuid>,
    pub category_id: Uuid,
    pub is_available: bool,
    pub price: Decimal,
    pub promo_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(name: impl Into<String>, category_id: Uuid, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            images: vec![],
            brand_id: None,
            category_id,
            is_available: true,
            price,
            promo_price: None,
            created_at: Utc::now(),
        }
    }

    /// Price the shopper pays: the promotional price when one is set.
    ///
    /// A promotional price above the base price is not rejected anywhere; it is
    /// used as-is.
    pub fn effective_price(&self) -> Decimal { self.promo_price.unwrap_or(self.price) }

    pub fn primary_image(&self) -> Option<&str> { self.images.first().map(String::as_str) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: Slug,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub show_in_menu: bool,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: impl Into<String>, slug: Slug) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            slug,
            description: None,
            images: vec![],
            show_in_menu: true,
            created_at: Utc::now(),
        }
    }
}
