//! Outbound text messaging over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::value_objects::PhoneNumber;

#[derive(Debug, Error)]
pub enum MessagingError {
    /// Transport failure, including timeouts.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The messaging API answered with a non-2xx status.
    #[error("Messaging API rejected the message: {status} - {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, to: &PhoneNumber, body: &str) -> Result<(), MessagingError>;
}

#[derive(Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

/// Posts `{to, type: "text", text: {body}}` with bearer auth.
#[derive(Clone)]
pub struct HttpMessenger {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpMessenger {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self, MessagingError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: endpoint.into(), token: token.into() })
    }
}

#[async_trait]
impl Messenger for HttpMessenger {
    async fn send_text(&self, to: &PhoneNumber, body: &str) -> Result<(), MessagingError> {
        let message = OutboundMessage { to: to.as_str(), kind: "text", text: TextBody { body } };
        let response = self.client.post(&self.endpoint).bearer_auth(&self.token).json(&message).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MessagingError::Rejected { status: status.as_u16(), body });
        }
        debug!(to = %to, status = status.as_u16(), "Message accepted");
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SentMessage {
    pub to: String,
    pub body: String,
}

/// Keeps messages in memory instead of sending them.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    reject_with: Mutex<Option<u16>>,
}

impl RecordingMessenger {
    pub fn new() -> Self { Self::default() }

    pub async fn sent(&self) -> Vec<SentMessage> { self.sent.lock().await.clone() }

    /// Answers every later send with this status, or accepts again with `None`.
    pub async fn reject_with(&self, status: Option<u16>) { *self.reject_with.lock().await = status; }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, to: &PhoneNumber, body: &str) -> Result<(), MessagingError> {
        if let Some(status) = *self.reject_with.lock().await {
            return Err(MessagingError::Rejected { status, body: "rejected".into() });
        }
        self.sent.lock().await.push(SentMessage { to: to.as_str().to_string(), body: body.to_string() });
        Ok(())
    }
}
