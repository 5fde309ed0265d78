//! Storefront service
//!
//! Catalog reads, bag synchronisation, order placement and the order
//! notification pipeline for a small made-to-order shop.
//!
//! ## Features
//! - Product listing, category pages and bestsellers over HTTP
//! - Local bag persisted on the client and mirrored per user
//! - Orders with customizable line items, written as one unit
//! - Order status lifecycle with milestone timestamps
//! - Text notifications when an order is confirmed or ready
//! - Back-office order management and dashboard rollups

pub mod analytics;
pub mod api;
pub mod auth;
pub mod bus;
pub mod cart;
pub mod config;
pub mod domain;
pub mod notify;
pub mod orders;
pub mod store;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{OrderError, OrderStatus};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Not allowed")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("Product not found")]
    ProductNotFound,

    #[error("Category not found")]
    CategoryNotFound,

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Cannot move order from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order was modified concurrently")]
    Conflict,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("Event bus error: {0}")]
    Bus(String),
}

impl From<OrderError> for Error {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::IllegalTransition { from, to } => Error::IllegalTransition { from, to },
            other => Error::Validation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
