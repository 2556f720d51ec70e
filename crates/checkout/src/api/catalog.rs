//! Catalog service client.
//!
//! Read-only product lookup, consumed solely to put names and images on
//! server cart lines (the cart service stores neither).

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use seagrape_core::ProductId;

use super::{ApiError, bearer_client, expect_success, parse_json};

/// Display data for one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDoc {
    /// Product display name.
    pub name: String,
    /// Primary image URL.
    pub image: String,
}

/// Read-only product lookup.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Fetch display data for a product.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotFound`] if the product is unknown.
    async fn get_product(&self, product_id: &ProductId) -> Result<ProductDoc, ApiError>;
}

/// JSON-over-HTTP [`CatalogApi`] implementation.
#[derive(Clone)]
pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogClient {
    /// Create a new catalog service client.
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
impl CatalogApi for HttpCatalogClient {
    #[instrument(skip(self), fields(product = %product_id))]
    async fn get_product(&self, product_id: &ProductId) -> Result<ProductDoc, ApiError> {
        let url = format!("{}/products/{product_id}", self.base_url);
        let response = self.client.get(url).send().await?;
        parse_json(expect_success(response).await?).await
    }
}
