//! Cart service client.
//!
//! The cart service stores an authenticated customer's cart as parallel
//! arrays of product IDs, quantities, and line totals; display details are
//! the catalog's business. All mutations return the updated cart document.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use seagrape_core::{CustomerId, Money, ProductId};

use super::{ApiError, bearer_client, expect_success, parse_json};
use crate::cart::CartOp;

/// Wire representation of a server cart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartDoc {
    /// Product IDs, one per line.
    pub product_ids: Vec<ProductId>,
    /// Quantities, parallel to `product_ids`.
    pub quantities: Vec<u32>,
    /// Line totals, parallel to `product_ids`.
    pub line_totals: Vec<Money>,
}

/// Body for the add-line mutation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddLineBody<'a> {
    product_id: &'a ProductId,
    quantity: u32,
    line_total: Money,
}

/// Body for the set-quantity mutation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetQuantityBody {
    quantity: u32,
}

/// Access to an authenticated customer's remote cart.
#[async_trait]
pub trait CartApi: Send + Sync {
    /// Fetch the customer's cart.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotFound`] if the customer has no cart record yet.
    async fn fetch_cart(&self, customer_id: &CustomerId) -> Result<CartDoc, ApiError>;

    /// Apply one mutation to the customer's cart and return the updated
    /// document.
    ///
    /// `Add` is defined as "increase quantity by the given amount", which is
    /// what makes per-item retry of a partial migration safe.
    async fn apply(&self, customer_id: &CustomerId, op: &CartOp) -> Result<CartDoc, ApiError>;
}

/// JSON-over-HTTP [`CartApi`] implementation.
#[derive(Clone)]
pub struct HttpCartClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCartClient {
    /// Create a new cart service client.
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

    fn cart_url(&self, customer_id: &CustomerId) -> String {
        format!("{}/carts/{customer_id}", self.base_url)
    }
}

#[async_trait]
impl CartApi for HttpCartClient {
    #[instrument(skip(self), fields(customer = %customer_id))]
    async fn fetch_cart(&self, customer_id: &CustomerId) -> Result<CartDoc, ApiError> {
        let response = self.client.get(self.cart_url(customer_id)).send().await?;
        parse_json(expect_success(response).await?).await
    }

    #[instrument(skip(self, op), fields(customer = %customer_id))]
    async fn apply(&self, customer_id: &CustomerId, op: &CartOp) -> Result<CartDoc, ApiError> {
        let cart_url = self.cart_url(customer_id);
        let response = match op {
            CartOp::Add {
                product_id,
                quantity,
                line_total,
            } => {
                self.client
                    .post(format!("{cart_url}/lines"))
                    .json(&AddLineBody {
                        product_id,
                        quantity: *quantity,
                        line_total: *line_total,
                    })
                    .send()
                    .await?
            }
            CartOp::SetQuantity {
                product_id,
                quantity,
            } => {
                self.client
                    .put(format!("{cart_url}/lines/{product_id}"))
                    .json(&SetQuantityBody {
                        quantity: *quantity,
                    })
                    .send()
                    .await?
            }
            CartOp::Remove { product_id } => {
                self.client
                    .delete(format!("{cart_url}/lines/{product_id}"))
                    .send()
                    .await?
            }
        };

        parse_json(expect_success(response).await?).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_doc_wire_names() {
        let doc = CartDoc {
            product_ids: vec![ProductId::new("p1")],
            quantities: vec![2],
            line_totals: vec![Money::from_minor_units(2000).unwrap()],
        };
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["productIds"][0], "p1");
        assert_eq!(json["quantities"][0], 2);
        assert_eq!(json["lineTotals"][0], "20.00");
    }

    #[test]
    fn test_empty_cart_doc_deserializes() {
        let doc: CartDoc =
            serde_json::from_str(r#"{"productIds":[],"quantities":[],"lineTotals":[]}"#).unwrap();
        assert!(doc.product_ids.is_empty());
    }
}
