//! Order notifications.
//!
//! Reacts to order status changes. Orders entering `confirmed` or `ready`
//! get one text message to the customer's phone; every other status is a
//! no-op. Each message is claimed in the order store before it goes out, so
//! a change reported by both the event bus and the database webhook is sent
//! once. Delivery failures release the claim and are returned to the caller.

mod client;
mod templates;
mod webhook;

pub use client::{HttpMessenger, Messenger, MessagingError, RecordingMessenger, SentMessage};
pub use templates::Template;
pub use webhook::{OrderRecord, OrderWebhookPayload};

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{PhoneError, PhoneNumber};
use crate::store::OrderStore;

/// A status change as reported by a trigger. `status` is kept raw so
/// unknown values can be ignored rather than rejected.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusChange {
    pub order_id: Uuid,
    pub status: String,
    pub previous_status: Option<String>,
}

impl StatusChange {
    /// `None` for events that are not status changes.
    pub fn from_event(event: &OrderEvent) -> Option<Self> {
        match event {
            OrderEvent::StatusChanged { order_id, from, to, .. } => Some(Self {
                order_id: *order_id,
                status: to.as_str().to_string(),
                previous_status: Some(from.as_str().to_string()),
            }),
            OrderEvent::Created { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    Skipped,
    Sent { template: Template, to: PhoneNumber },
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool { matches!(self, Self::Sent { .. }) }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to load order {order_id}: {source}")]
    Fetch { order_id: Uuid, source: crate::Error },

    #[error("Failed to record notification for order {order_id}: {source}")]
    Record { order_id: Uuid, source: crate::Error },

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Order {0} has no customer phone number")]
    MissingPhone(Uuid),

    #[error("Order {order_id} has an unusable phone number: {source}")]
    InvalidPhone { order_id: Uuid, source: PhoneError },

    #[error(transparent)]
    Delivery(#[from] MessagingError),
}

pub struct NotificationDispatcher {
    orders: Arc<dyn OrderStore>,
    messenger: Arc<dyn Messenger>,
}

impl NotificationDispatcher {
    pub fn new(orders: Arc<dyn OrderStore>, messenger: Arc<dyn Messenger>) -> Self { Self { orders, messenger } }

    pub async fn handle(&self, change: &StatusChange) -> Result<DispatchOutcome, DispatchError> {
        let order_id = change.order_id;
        let Ok(status) = change.status.parse::<OrderStatus>() else {
            debug!(order_id = %order_id, status = %change.status, "Unrecognised status, nothing to send");
            return Ok(DispatchOutcome::Skipped);
        };
        let Some(template) = Template::for_status(status) else {
            return Ok(DispatchOutcome::Skipped);
        };
        if change.previous_status.as_deref() == Some(status.as_str()) {
            debug!(order_id = %order_id, status = %status, "Status unchanged, nothing to send");
            return Ok(DispatchOutcome::Skipped);
        }

        let details = self.orders.order_details(order_id).await
            .map_err(|source| DispatchError::Fetch { order_id, source })?
            .ok_or(DispatchError::OrderNotFound(order_id))?;
        let raw_phone = details.customer.phone.as_deref().ok_or(DispatchError::MissingPhone(order_id))?;
        let to = PhoneNumber::normalize(raw_phone).map_err(|source| DispatchError::InvalidPhone { order_id, source })?;

        let claimed = self.orders.claim_notification(order_id, template.key(), Utc::now()).await
            .map_err(|source| DispatchError::Record { order_id, source })?;
        if !claimed {
            debug!(order_id = %order_id, template = ?template, "Notification already sent");
            return Ok(DispatchOutcome::Skipped);
        }

        let body = template.render(&details);
        if let Err(e) = self.messenger.send_text(&to, &body).await {
            error!(order_id = %order_id, template = ?template, error = %e, "Order notification failed");
            if let Err(release) = self.orders.release_notification(order_id, template.key()).await {
                warn!(order_id = %order_id, error = %release, "Failed to release notification claim");
            }
            return Err(e.into());
        }
        info!(order_id = %order_id, template = ?template, "Order notification sent");
        Ok(DispatchOutcome::Sent { template, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Session;
    use crate::domain::aggregates::{Address, Profile};
    use crate::orders::{place_order, CreateOrderRequest, OrderItemRequest};
    use crate::store::{AccountStore, MemoryStore};
    use chrono::Utc;
    use rust_decimal::Decimal;

    async fn setup(phone: Option<&str>) -> (Arc<MemoryStore>, Arc<RecordingMessenger>, NotificationDispatcher, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let user = Uuid::new_v4();
        store.upsert_profile(&Profile {
            id: user,
            full_name: Some("Omar".into()),
            phone: phone.map(str::to_string),
            email: None,
            address: Some(Address { street: "3 Cedar Ln".into(), city: "Amman".into(), ..Default::default() }),
            updated_at: Utc::now(),
        }).await.unwrap();
        let request = CreateOrderRequest {
            items: vec![OrderItemRequest { product_id: None, quantity: 1, base_price: Decimal::new(80, 0), customization: None, customization_fee: Some(Decimal::new(5, 0)) }],
            notes: None,
        };
        let placed = place_order(store.as_ref(), &Session::user(user), request, Utc::now()).await.unwrap();
        let dispatcher = NotificationDispatcher::new(store.clone(), messenger.clone());
        (store, messenger, dispatcher, placed.order.id)
    }

    fn change(order_id: Uuid, status: &str) -> StatusChange {
        StatusChange { order_id, status: status.into(), previous_status: None }
    }

    #[tokio::test]
    async fn test_other_statuses_send_nothing() {
        let (_, messenger, dispatcher, id) = setup(Some("+962 7 9000")).await;
        for status in ["production", "pending", "in_progress", "delivered", "rejected"] {
            assert_eq!(dispatcher.handle(&change(id, status)).await.unwrap(), DispatchOutcome::Skipped);
        }
        assert!(messenger.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_sends_one_message() {
        let (_, messenger, dispatcher, id) = setup(Some("+962 (7) 9000-11")).await;
        let outcome = dispatcher.handle(&change(id, "confirmed")).await.unwrap();
        assert!(outcome.is_sent());
        let sent = messenger.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "+9627900011");
        let short = id.to_string()[..8].to_uppercase();
        assert!(sent[0].body.contains(&short));
        assert!(sent[0].body.contains("Item total: 85"));
    }

    #[tokio::test]
    async fn test_unchanged_status_is_skipped() {
        let (_, messenger, dispatcher, id) = setup(Some("+1 555")).await;
        let mut c = change(id, "ready");
        c.previous_status = Some("ready".into());
        assert_eq!(dispatcher.handle(&c).await.unwrap(), DispatchOutcome::Skipped);
        assert!(messenger.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_same_change_from_two_sources_sends_once() {
        let (_, messenger, dispatcher, id) = setup(Some("+1 555")).await;
        let mut from_webhook = change(id, "confirmed");
        from_webhook.previous_status = Some("pending".into());
        assert!(dispatcher.handle(&change(id, "confirmed")).await.unwrap().is_sent());
        assert_eq!(dispatcher.handle(&from_webhook).await.unwrap(), DispatchOutcome::Skipped);
        assert!(dispatcher.handle(&change(id, "ready")).await.unwrap().is_sent());
        assert_eq!(messenger.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_delivery_can_be_retried() {
        let (_, messenger, dispatcher, id) = setup(Some("+1 555")).await;
        messenger.reject_with(Some(503)).await;
        assert!(dispatcher.handle(&change(id, "confirmed")).await.is_err());
        messenger.reject_with(None).await;
        assert!(dispatcher.handle(&change(id, "confirmed")).await.unwrap().is_sent());
        assert_eq!(messenger.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_detail_fetch_failure_propagates() {
        let (store, messenger, dispatcher, id) = setup(Some("+1 555")).await;
        store.fail_reads(true).await;
        assert!(matches!(dispatcher.handle(&change(id, "confirmed")).await, Err(DispatchError::Fetch { .. })));
        assert!(messenger.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_failures_propagate() {
        let (_, messenger, dispatcher, id) = setup(Some("+1 555")).await;
        messenger.reject_with(Some(401)).await;
        assert!(matches!(
            dispatcher.handle(&change(id, "ready")).await,
            Err(DispatchError::Delivery(MessagingError::Rejected { status: 401, .. }))
        ));
        assert!(matches!(dispatcher.handle(&change(Uuid::new_v4(), "ready")).await, Err(DispatchError::OrderNotFound(_))));

        let (_, _, no_phone, id) = setup(None).await;
        assert!(matches!(no_phone.handle(&change(id, "confirmed")).await, Err(DispatchError::MissingPhone(_))));
    }
}
