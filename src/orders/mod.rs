//! Order placement and status transitions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

use crate::auth::Session;
use crate::bus::EventPublisher;
use crate::domain::aggregates::{Customization, NewLineItem, Order, OrderLineItem, OrderStatus};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::Quantity;
use crate::store::OrderStore;
use crate::{Error, Result};

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "an order needs at least one item"))]
    pub items: Vec<OrderItemRequest>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct OrderItemRequest {
    pub product_id: Option<Uuid>,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: u32,
    pub base_price: Decimal,
    pub customization: Option<Customization>,
    pub customization_fee: Option<Decimal>,
}

impl OrderItemRequest {
    fn into_line(self) -> Result<NewLineItem> {
        let quantity = Quantity::new(self.quantity).map_err(|e| Error::Validation(e.to_string()))?;
        Ok(NewLineItem {
            product_id: self.product_id,
            quantity,
            base_price: self.base_price,
            customization: self.customization,
            customization_fee: self.customization_fee,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderLineItem>,
}

/// Places an order for the signed-in caller. Nothing is written for anonymous callers.
pub async fn place_order<S>(store: &S, session: &Session, request: CreateOrderRequest, now: DateTime<Utc>) -> Result<PlacedOrder>
where
    S: OrderStore + ?Sized,
{
    let user_id = session.require_user()?;
    request.validate().map_err(|e| Error::Validation(e.to_string()))?;
    for item in &request.items {
        item.validate().map_err(|e| Error::Validation(e.to_string()))?;
    }
    let lines = request.items.into_iter().map(OrderItemRequest::into_line).collect::<Result<Vec<_>>>()?;
    let (mut order, items) = Order::place(user_id, lines, request.notes, now)?;
    store.insert_order(&order, &items).await?;
    order.take_events();
    info!(order_id = %order.id, user_id = %user_id, total = %order.total_amount, items = items.len(), "Order placed");
    Ok(PlacedOrder { order, items })
}

/// Moves an order to `to`, persists it and publishes the status change.
///
/// A failed publish is logged; the committed transition is still returned.
pub async fn transition_status<S>(store: &S, publisher: &dyn EventPublisher, order_id: Uuid, to: OrderStatus, now: DateTime<Utc>) -> Result<Order>
where
    S: OrderStore + ?Sized,
{
    let mut order = store.get_order(order_id).await?.ok_or(Error::OrderNotFound(order_id))?;
    let from = order.transition(to, now)?;
    store.save_transition(&order, from).await?;
    info!(order_id = %order_id, from = %from, to = %to, "Order status changed");

    for event in order.take_events() {
        let DomainEvent::Order(event) = event;
        if let OrderEvent::StatusChanged { .. } = event {
            if let Err(e) = publisher.publish(&event).await {
                error!(order_id = %order_id, error = %e, "Failed to publish order status change");
            }
        }
    }
    Ok(order)
}
