//! Outbound mail delivery.
//!
//! Mail is sent through a `MailTransport`; the production implementation is
//! an HTTP client for an external relay service, and a no-op transport is
//! used when no relay is configured.

mod client;

pub use client::HttpMailClient;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// A message ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Trait for outbound mail delivery.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver the message, returning a transport-assigned message id.
    async fn send(&self, mail: &OutboundMail) -> Result<String>;
}

/// No-op transport that only logs the message.
/// Used when no mail relay is configured.
pub struct NoOpMailTransport;

#[async_trait]
impl MailTransport for NoOpMailTransport {
    async fn send(&self, mail: &OutboundMail) -> Result<String> {
        let message_id = uuid::Uuid::new_v4().to_string();
        info!(
            "No mail relay configured, dropping message {} to {} (subject: {})",
            message_id, mail.to, mail.subject
        );
        Ok(message_id)
    }
}
