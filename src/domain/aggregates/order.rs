//! Order Aggregate

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{OrderRef, Quantity};

/// Order lifecycle.
///
/// ```text
/// pending -> reviewing -> confirmed -> in_progress -> ready -> delivered -> completed
///    |           |            \______________________/
///    +-----------+--> rejected
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Reviewing,
    Confirmed,
    InProgress,
    Ready,
    Delivered,
    Completed,
    Rejected,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        Self::Pending, Self::Reviewing, Self::Confirmed, Self::InProgress,
        Self::Ready, Self::Delivered, Self::Completed, Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reviewing => "reviewing",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Ready => "ready",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Statuses reachable in one step.
    pub fn next_allowed(&self) -> &'static [OrderStatus] {
        match self {
            Self::Pending => &[Self::Reviewing, Self::Confirmed, Self::Rejected],
            Self::Reviewing => &[Self::Confirmed, Self::Rejected],
            Self::Confirmed => &[Self::InProgress, Self::Ready],
            Self::InProgress => &[Self::Ready],
            Self::Ready => &[Self::Delivered],
            Self::Delivered => &[Self::Completed],
            Self::Completed | Self::Rejected => &[],
        }
    }

    pub fn can_transition_to(&self, to: OrderStatus) -> bool { self.next_allowed().contains(&to) }
    pub fn is_terminal(&self) -> bool { self.next_allowed().is_empty() }

    /// Statuses whose items count as sold.
    pub fn is_sold(&self) -> bool { matches!(self, Self::Completed | Self::Delivered) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

/// Known customization schemas, with a free-form fallback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Customization {
    Engraving { text: String, #[serde(default, skip_serializing_if = "Option::is_none")] font: Option<String> },
    GiftWrap { #[serde(default, skip_serializing_if = "Option::is_none")] message: Option<String> },
    Size { value: String },
    Attributes { fields: BTreeMap<String, String> },
}

impl Customization {
    /// Key/value pairs in display order.
    pub fn pairs(&self) -> Vec<(String, String)> {
        match self {
            Self::Engraving { text, font } => {
                let mut out = vec![("Engraving".to_string(), text.clone())];
                if let Some(font) = font { out.push(("Font".to_string(), font.clone())); }
                out
            }
            Self::GiftWrap { message } => {
                let mut out = vec![("Gift wrap".to_string(), "Yes".to_string())];
                if let Some(m) = message { out.push(("Gift message".to_string(), m.clone())); }
                out
            }
            Self::Size { value } => vec![("Size".to_string(), value.clone())],
            Self::Attributes { fields } => fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

/// Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub quantity: Quantity,
    pub base_price: Decimal,
    pub customization: Option<Customization>,
    pub customization_fee: Decimal,
    /// Per-unit total: base price plus customization fee.
    pub item_total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl OrderLineItem {
    /// Item total multiplied by quantity.
    pub fn line_total(&self) -> Decimal { self.item_total * self.quantity.as_decimal() }
}

/// Checkout input for one line.
#[derive(Clone, Debug, PartialEq)]
pub struct NewLineItem {
    pub product_id: Option<Uuid>,
    pub quantity: Quantity,
    pub base_price: Decimal,
    pub customization: Option<Customization>,
    pub customization_fee: Option<Decimal>,
}

impl NewLineItem {
    pub fn item_total(&self) -> Decimal { self.base_price + self.customization_fee.unwrap_or(Decimal::ZERO) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    status: OrderStatus,
    confirmed_at: Option<DateTime<Utc>>,
    ready_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Raw persisted milestone columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Milestones {
    pub confirmed_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Builds a pending order and its lines. Total = sum of (base + fee) x quantity.
    pub fn place(user_id: Uuid, items: Vec<NewLineItem>, notes: Option<String>, now: DateTime<Utc>) -> Result<(Self, Vec<OrderLineItem>), OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let id = Uuid::new_v4();
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            if item.base_price < Decimal::ZERO { return Err(OrderError::NegativeAmount("base_price")); }
            if item.customization_fee.is_some_and(|f| f < Decimal::ZERO) { return Err(OrderError::NegativeAmount("customization_fee")); }
            lines.push(OrderLineItem {
                id: Uuid::new_v4(),
                order_id: id,
                product_id: item.product_id,
                quantity: item.quantity,
                base_price: item.base_price,
                customization_fee: item.customization_fee.unwrap_or(Decimal::ZERO),
                item_total: item.item_total(),
                customization: item.customization,
                created_at: now,
            });
        }
        let total_amount = lines.iter().map(OrderLineItem::line_total).sum();
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let mut order = Self {
            id, user_id, total_amount, notes, status: OrderStatus::Pending,
            confirmed_at: None, ready_at: None, delivered_at: None, completed_at: None,
            created_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Created { order_id: id, user_id, total_amount }));
        Ok((order, lines))
    }

    /// Rebuilds an order from stored columns without raising events.
    pub fn restore(id: Uuid, user_id: Uuid, total_amount: Decimal, notes: Option<String>, status: OrderStatus, milestones: Milestones, created_at: DateTime<Utc>) -> Self {
        Self {
            id, user_id, total_amount, notes, status,
            confirmed_at: milestones.confirmed_at, ready_at: milestones.ready_at,
            delivered_at: milestones.delivered_at, completed_at: milestones.completed_at,
            created_at, events: vec![],
        }
    }

    pub fn status(&self) -> OrderStatus { self.status }
    pub fn reference(&self) -> OrderRef { OrderRef::from_id(&self.id) }
    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> { self.confirmed_at }
    pub fn ready_at(&self) -> Option<DateTime<Utc>> { self.ready_at }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn completed_at(&self) -> Option<DateTime<Utc>> { self.completed_at }

    pub fn milestones(&self) -> Milestones {
        Milestones { confirmed_at: self.confirmed_at, ready_at: self.ready_at, delivered_at: self.delivered_at, completed_at: self.completed_at }
    }

    /// The only writer of status and milestone timestamps.
    pub fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<OrderStatus, OrderError> {
        let from = self.status;
        if !from.can_transition_to(to) { return Err(OrderError::IllegalTransition { from, to }); }
        self.status = to;
        match to {
            OrderStatus::Confirmed => self.confirmed_at = Some(now),
            OrderStatus::Ready => self.ready_at = Some(now),
            OrderStatus::Delivered => self.delivered_at = Some(now),
            OrderStatus::Completed => self.completed_at = Some(now),
            _ => {}
        }
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to, at: now }));
        Ok(from)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("{0} must not be negative")]
    NegativeAmount(&'static str),
    #[error("unknown order status '{0}'")]
    UnknownStatus(String),
    #[error("cannot move order from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(base: i64, fee: Option<i64>, qty: u32) -> NewLineItem {
        NewLineItem {
            product_id: Some(Uuid::new_v4()),
            quantity: Quantity::new(qty).unwrap(),
            base_price: Decimal::new(base, 0),
            customization: None,
            customization_fee: fee.map(|f| Decimal::new(f, 0)),
        }
    }

    #[test]
    fn test_place_totals() {
        let (order, lines) = Order::place(Uuid::new_v4(), vec![line(250, Some(50), 1), line(100, None, 3)], None, Utc::now()).unwrap();
        assert_eq!(lines[0].item_total, Decimal::new(300, 0));
        assert_eq!(lines[1].item_total, Decimal::new(100, 0));
        assert_eq!(order.total_amount, Decimal::new(600, 0));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.milestones(), Milestones::default());
        assert!(lines.iter().all(|l| l.order_id == order.id));
    }

    #[test]
    fn test_place_rejects_empty_and_negative() {
        assert_eq!(Order::place(Uuid::new_v4(), vec![], None, Utc::now()).unwrap_err(), OrderError::NoItems);
        let err = Order::place(Uuid::new_v4(), vec![line(10, Some(-1), 1)], None, Utc::now()).unwrap_err();
        assert_eq!(err, OrderError::NegativeAmount("customization_fee"));
    }

    #[test]
    fn test_order_workflow() {
        let (mut order, _) = Order::place(Uuid::new_v4(), vec![line(10, None, 2)], Some("  ".into()), Utc::now()).unwrap();
        assert_eq!(order.notes, None);
        order.take_events();
        let t1 = Utc::now();
        assert_eq!(order.transition(OrderStatus::Confirmed, t1).unwrap(), OrderStatus::Pending);
        assert_eq!(order.confirmed_at(), Some(t1));
        order.transition(OrderStatus::InProgress, t1).unwrap();
        order.transition(OrderStatus::Ready, t1).unwrap();
        order.transition(OrderStatus::Delivered, t1).unwrap();
        order.transition(OrderStatus::Completed, t1).unwrap();
        assert!(order.status().is_terminal());
        assert!(order.ready_at().is_some() && order.delivered_at().is_some() && order.completed_at().is_some());
        assert_eq!(order.take_events().len(), 5);
    }

    #[test]
    fn test_illegal_transitions() {
        let (mut order, _) = Order::place(Uuid::new_v4(), vec![line(10, None, 1)], None, Utc::now()).unwrap();
        let err = order.transition(OrderStatus::Ready, Utc::now()).unwrap_err();
        assert_eq!(err, OrderError::IllegalTransition { from: OrderStatus::Pending, to: OrderStatus::Ready });
        assert!(order.transition(OrderStatus::Pending, Utc::now()).is_err());
        order.transition(OrderStatus::Rejected, Utc::now()).unwrap();
        for to in OrderStatus::ALL {
            assert!(order.transition(to, Utc::now()).is_err());
        }
        assert_eq!(order.status(), OrderStatus::Rejected);
    }

    #[test]
    fn test_rejected_only_from_review_states() {
        assert!(OrderStatus::Reviewing.can_transition_to(OrderStatus::Rejected));
        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Rejected));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("in_progress".parse::<OrderStatus>().unwrap(), OrderStatus::InProgress);
        assert!("production".parse::<OrderStatus>().is_err());
        assert_eq!(serde_json::to_string(&OrderStatus::InProgress).unwrap(), "\"in_progress\"");
    }

    #[test]
    fn test_customization_pairs() {
        let c: Customization = serde_json::from_value(serde_json::json!({"kind": "engraving", "text": "A & B"})).unwrap();
        assert_eq!(c.pairs(), vec![("Engraving".to_string(), "A & B".to_string())]);
        let attrs = Customization::Attributes { fields: BTreeMap::from([("Color".into(), "Red".into()), ("Band".into(), "Leather".into())]) };
        assert_eq!(attrs.pairs()[0].0, "Band");
    }
}
