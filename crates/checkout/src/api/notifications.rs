//! Notification service client.
//!
//! One operation: queue an order-confirmation email. The service replies
//! `202 Accepted` once the message is queued; delivery is its problem.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use seagrape_core::OrderId;

use super::{ApiError, bearer_client, expect_success};

/// Body for the order-confirmation email request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationEmailDoc {
    /// Recipient address.
    pub to: String,
    /// Recipient display name.
    pub name: String,
    /// Confirmed order ID.
    pub order_id: OrderId,
    /// Display-only confirmation code.
    pub confirmation_code: String,
}

/// Outbound transactional notifications.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Queue an order-confirmation email.
    async fn send_confirmation(&self, doc: &ConfirmationEmailDoc) -> Result<(), ApiError>;
}

/// JSON-over-HTTP [`NotificationApi`] implementation.
#[derive(Clone)]
pub struct HttpNotificationClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotificationClient {
    /// Create a new notification service client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(base_url: &str, api_key: &SecretString) -> Result<Self, ApiError> {
        Ok(Self {
            client: bearer_client(api_key)?,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationClient {
    #[instrument(skip(self, doc), fields(order = %doc.order_id))]
    async fn send_confirmation(&self, doc: &ConfirmationEmailDoc) -> Result<(), ApiError> {
        let url = format!("{}/notifications/order-confirmation", self.base_url);
        let response = self.client.post(url).json(doc).send().await?;
        expect_success(response).await?;
        Ok(())
    }
}
