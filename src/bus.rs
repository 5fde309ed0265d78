//! Order event publishing.
//!
//! With NATS configured, status changes go out on `orders.status_changed` and
//! a subscriber feeds them to the notification dispatcher. Without it the
//! dispatcher runs in-process on publish.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::events::OrderEvent;
use crate::notify::{NotificationDispatcher, StatusChange};
use crate::{Error, Result};

pub const SUBJECT_PREFIX: &str = "orders";

pub fn subject_for(event: &OrderEvent) -> String { format!("{SUBJECT_PREFIX}.{}", event.name()) }

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OrderEvent) -> Result<()>;
}

pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &OrderEvent) -> Result<()> {
        let order_id = event.order_id();
        let subject = subject_for(event);
        let payload = serde_json::to_vec(event).map_err(|e| Error::Bus(format!("order {order_id}: {e}")))?;
        self.client.publish(subject.clone(), payload.into()).await
            .map_err(|e| Error::Bus(format!("order {order_id}: {e}")))?;
        debug!(order_id = %order_id, subject = %subject, "Published order event");
        Ok(())
    }
}

/// Runs the dispatcher on publish instead of going through a broker.
pub struct InlinePublisher {
    dispatcher: Arc<NotificationDispatcher>,
}

impl InlinePublisher {
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self { Self { dispatcher } }
}

#[async_trait]
impl EventPublisher for InlinePublisher {
    async fn publish(&self, event: &OrderEvent) -> Result<()> {
        let Some(change) = StatusChange::from_event(event) else { return Ok(()) };
        self.dispatcher.handle(&change).await.map(|_| ()).map_err(|e| Error::Bus(e.to_string()))
    }
}

/// Collects published events.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<OrderEvent>>,
}

impl RecordingPublisher {
    pub async fn events(&self) -> Vec<OrderEvent> { self.events.lock().await.clone() }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &OrderEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Feeds status-change events from NATS to the dispatcher until the subscription ends.
pub async fn run_status_subscriber(client: async_nats::Client, dispatcher: Arc<NotificationDispatcher>) -> Result<()> {
    let subject = format!("{SUBJECT_PREFIX}.status_changed");
    let mut subscriber = client.subscribe(subject.clone()).await.map_err(|e| Error::Bus(e.to_string()))?;
    info!(subject = %subject, "Listening for order status changes");
    while let Some(message) = subscriber.next().await {
        let event: OrderEvent = match serde_json::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping malformed order event");
                continue;
            }
        };
        let Some(change) = StatusChange::from_event(&event) else { continue };
        if let Err(e) = dispatcher.handle(&change).await {
            error!(order_id = %change.order_id, error = %e, "Notification dispatch failed");
        }
    }
    warn!(subject = %subject, "Order status subscription closed");
    Ok(())
}
