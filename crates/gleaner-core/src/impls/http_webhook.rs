//! Webhook delivery over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::WebhookPayload;
use crate::error::{DeliveryError, truncate_reason};
use crate::ports::WebhookSender;

pub struct HttpWebhookSender {
    client: Client,
    url: String,
}

impl HttpWebhookSender {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    DeliveryError::Transport(truncate_reason(&e.to_string()))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(())
    }
}
