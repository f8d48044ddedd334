//! HTTP client for the external mail relay service.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{MailTransport, OutboundMail};

/// HTTP client for communicating with the mail relay.
pub struct HttpMailClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMailClient {
    /// Create a new mail relay client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the relay service (e.g., "http://localhost:8025")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: String, timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }
}

#[derive(Debug, Deserialize, Default)]
struct RelayResponse {
    #[serde(default)]
    id: Option<String>,
}

#[async_trait]
impl MailTransport for HttpMailClient {
    async fn send(&self, mail: &OutboundMail) -> Result<String> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(mail)
            .send()
            .await
            .context("Failed to connect to mail relay")?;

        if !response.status().is_success() {
            bail!("Mail relay rejected message: status {}", response.status());
        }

        // Some relays return a message id, some return an empty body
        let parsed: RelayResponse = response.json().await.unwrap_or_default();
        Ok(parsed
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()))
    }
}
