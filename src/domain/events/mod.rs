//! Domain events
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "aggregate", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, user_id: Uuid, total_amount: Decimal },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus, at: DateTime<Utc> },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Created { order_id, .. } | Self::StatusChanged { order_id, .. } => *order_id,
        }
    }

    /// Subject suffix used when the event leaves the process.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::StatusChanged { .. } => "status_changed",
        }
    }
}
