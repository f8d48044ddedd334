//! Email send handler.
//!
//! Delivers a message through the configured mail transport.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

use crate::mailer::{MailTransport, OutboundMail};

use super::JobHandler;

/// Handler for `EMAIL_SEND` jobs.
///
/// Expects a payload of the shape `{"to": ..., "subject": ..., "body": ...}`.
pub struct EmailSendHandler {
    transport: Arc<dyn MailTransport>,
    from: String,
}

impl EmailSendHandler {
    pub fn new(transport: Arc<dyn MailTransport>, from: String) -> Self {
        Self { transport, from }
    }
}

fn non_empty_str<'a>(payload: &'a JsonValue, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl JobHandler for EmailSendHandler {
    async fn execute(&self, job_id: &str, payload: &JsonValue) -> Result<JsonValue> {
        let (to, subject, body) = match (
            non_empty_str(payload, "to"),
            non_empty_str(payload, "subject"),
            non_empty_str(payload, "body"),
        ) {
            (Some(to), Some(subject), Some(body)) => (to, subject, body),
            _ => bail!("Invalid payload: to, subject, and body are required"),
        };

        let mail = OutboundMail {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        };
        let message_id = self.transport.send(&mail).await?;

        info!("Email job {} delivered, message id {}", job_id, message_id);

        Ok(serde_json::json!({
            "messageId": message_id,
        }))
    }
}
