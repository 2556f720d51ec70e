//! Order service client.
//!
//! Order creation is the one remote call in the system that must not run
//! twice for the same payment session. The draft carries the payment session
//! ID as its idempotency key; a `409 Conflict` whose body is the existing
//! order record is unwrapped and returned as success, because the remote
//! side is authoritative about what already exists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use seagrape_core::{CustomerId, Money, OrderId, PaymentSessionId, ProductId};

use super::{ApiError, bearer_client, expect_success, parse_json};

/// One line of an order draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineDoc {
    /// Product ID.
    pub product_id: ProductId,
    /// Product display name at purchase time.
    pub name: String,
    /// Product image URL at purchase time.
    pub image: String,
    /// Unit price at purchase time.
    pub unit_price: Money,
    /// Quantity purchased.
    pub quantity: u32,
}

/// Order draft submitted for creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraftDoc {
    /// Payment session that funds this order; doubles as the idempotency key.
    pub payment_session_id: PaymentSessionId,
    /// Purchased lines.
    pub lines: Vec<OrderLineDoc>,
    /// Order total.
    pub total: Money,
}

/// Record returned by the order service on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedDoc {
    /// Assigned order ID.
    pub order_id: OrderId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Order creation for guest and authenticated checkouts.
///
/// Implementations must be idempotent per payment session: a draft whose
/// payment session already produced an order returns the existing record
/// instead of creating a second one.
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// Create an order for a guest checkout.
    async fn create_guest(&self, draft: &OrderDraftDoc) -> Result<OrderCreatedDoc, ApiError>;

    /// Create an order attributed to an authenticated customer.
    async fn create_for_customer(
        &self,
        customer_id: &CustomerId,
        draft: &OrderDraftDoc,
    ) -> Result<OrderCreatedDoc, ApiError>;
}

/// JSON-over-HTTP [`OrderApi`] implementation.
#[derive(Clone)]
pub struct HttpOrderClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrderClient {
    /// Create a new order service client.
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

    /// POST a draft and unwrap conflict-with-body as success.
    async fn post_draft(
        &self,
        url: String,
        draft: &OrderDraftDoc,
    ) -> Result<OrderCreatedDoc, ApiError> {
        let response = self.client.post(url).json(draft).send().await?;

        match expect_success(response).await {
            Ok(response) => parse_json(response).await,
            // The service rejects duplicate payment sessions with the
            // existing order record in the body; that record is the answer.
            Err(ApiError::Conflict(body)) => serde_json::from_str(&body).map_or_else(
                |_| Err(ApiError::Conflict(body.clone())),
                |existing: OrderCreatedDoc| {
                    tracing::info!(
                        order = %existing.order_id,
                        "order already exists for payment session, using existing record"
                    );
                    Ok(existing)
                },
            ),
            Err(other) => Err(other),
        }
    }
}

#[async_trait]
impl OrderApi for HttpOrderClient {
    #[instrument(skip(self, draft), fields(session = %draft.payment_session_id))]
    async fn create_guest(&self, draft: &OrderDraftDoc) -> Result<OrderCreatedDoc, ApiError> {
        self.post_draft(format!("{}/orders/guest", self.base_url), draft)
            .await
    }

    #[instrument(
        skip(self, draft),
        fields(customer = %customer_id, session = %draft.payment_session_id)
    )]
    async fn create_for_customer(
        &self,
        customer_id: &CustomerId,
        draft: &OrderDraftDoc,
    ) -> Result<OrderCreatedDoc, ApiError> {
        self.post_draft(
            format!("{}/orders/customers/{customer_id}", self.base_url),
            draft,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_wire_names() {
        let draft = OrderDraftDoc {
            payment_session_id: PaymentSessionId::new("sess_1"),
            lines: vec![OrderLineDoc {
                product_id: ProductId::new("p1"),
                name: "Sea Salt Caramel".to_string(),
                image: "https://cdn.example.com/p1.jpg".to_string(),
                unit_price: Money::from_minor_units(1000).unwrap(),
                quantity: 2,
            }],
            total: Money::from_minor_units(2000).unwrap(),
        };
        let json = serde_json::to_value(&draft).unwrap();

        assert_eq!(json["paymentSessionId"], "sess_1");
        assert_eq!(json["lines"][0]["unitPrice"], "10.00");
        assert_eq!(json["total"], "20.00");
    }

    #[test]
    fn test_created_doc_parses() {
        let doc: OrderCreatedDoc = serde_json::from_str(
            r#"{"orderId":"ord_1","createdAt":"2026-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(doc.order_id, OrderId::new("ord_1"));
    }
}
