//! Payment gateway client.
//!
//! Checkout sessions live at the gateway; this client only reads them back
//! after the buyer returns from the hosted payment page.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use seagrape_core::PaymentSessionId;

use super::{ApiError, bearer_client, expect_success, parse_json};

/// Wire representation of a gateway checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionDoc {
    /// Buyer email collected by the gateway, if any.
    #[serde(default)]
    pub buyer_email: Option<String>,
    /// Buyer name collected by the gateway, if any.
    #[serde(default)]
    pub buyer_name: Option<String>,
    /// Shipping address lines, top to bottom.
    #[serde(default)]
    pub shipping_address: Vec<String>,
    /// Gateway session status (`open`, `complete`, `expired`).
    pub status: String,
}

/// Read access to gateway checkout sessions.
#[async_trait]
pub trait PaymentSessionApi: Send + Sync {
    /// Fetch a checkout session by ID.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotFound`] if the gateway no longer knows the session.
    async fn fetch_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<PaymentSessionDoc, ApiError>;
}

/// JSON-over-HTTP [`PaymentSessionApi`] implementation.
#[derive(Clone)]
pub struct HttpPaymentGatewayClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPaymentGatewayClient {
    /// Create a new payment gateway client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(base_url: &str, secret_key: &SecretString) -> Result<Self, ApiError> {
        Ok(Self {
            client: bearer_client(secret_key)?,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl PaymentSessionApi for HttpPaymentGatewayClient {
    #[instrument(skip(self), fields(session = %session_id))]
    async fn fetch_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<PaymentSessionDoc, ApiError> {
        let url = format!("{}/checkout/sessions/{session_id}", self.base_url);
        let response = self.client.get(url).send().await?;
        parse_json(expect_success(response).await?).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_doc_tolerates_missing_buyer_fields() {
        let doc: PaymentSessionDoc = serde_json::from_str(r#"{"status":"complete"}"#).unwrap();
        assert!(doc.buyer_email.is_none());
        assert!(doc.buyer_name.is_none());
        assert!(doc.shipping_address.is_empty());
        assert_eq!(doc.status, "complete");
    }
}
