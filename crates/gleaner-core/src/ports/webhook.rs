//! WebhookSender port - 通知の送信
//!
//! 結果は Result で返す。リトライ判断は Notifier 側が行う。

use async_trait::async_trait;

use crate::domain::WebhookPayload;
use crate::error::DeliveryError;

#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// One delivery attempt. `Ok` only for a 2xx response.
    async fn send(&self, payload: &WebhookPayload) -> Result<(), DeliveryError>;
}
