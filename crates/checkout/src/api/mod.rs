//! Transport layer for the remote services the engine consumes.
//!
//! # Architecture
//!
//! Every remote dependency sits behind a small async trait (`CartApi`,
//! `CatalogApi`, `OrderApi`, `PaymentSessionApi`, `NotificationApi`) so the
//! components above can be driven by in-process fakes in tests. The shipped
//! implementations are plain JSON-over-HTTP clients built on `reqwest` with
//! bearer authentication.
//!
//! Status mapping is uniform across clients: 404 becomes [`ApiError::NotFound`],
//! 409 becomes [`ApiError::Conflict`], any other non-success status becomes
//! [`ApiError::Api`] carrying the response body for diagnostics.

mod carts;
mod catalog;
mod notifications;
mod orders;
mod payments;

pub use carts::{CartApi, CartDoc, HttpCartClient};
pub use catalog::{CatalogApi, HttpCatalogClient, ProductDoc};
pub use notifications::{ConfirmationEmailDoc, HttpNotificationClient, NotificationApi};
pub use orders::{HttpOrderClient, OrderApi, OrderCreatedDoc, OrderDraftDoc, OrderLineDoc};
pub use payments::{HttpPaymentGatewayClient, PaymentSessionApi, PaymentSessionDoc};

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Errors that can occur when calling a remote service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connect, timeout, abort).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated for logging.
        message: String,
    },

    /// The response body could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The requested resource does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The resource already exists on the remote side (409).
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Build a `reqwest` client with bearer authentication preconfigured.
pub(crate) fn bearer_client(api_key: &SecretString) -> Result<reqwest::Client, ApiError> {
    let mut headers = HeaderMap::new();

    let auth_value = format!("Bearer {}", api_key.expose_secret());
    let mut auth_header = HeaderValue::from_str(&auth_value)
        .map_err(|e| ApiError::Parse(format!("invalid API key format: {e}")))?;
    auth_header.set_sensitive(true);
    headers.insert("Authorization", auth_header);

    headers.insert("Content-Type", HeaderValue::from_static("application/json"));

    Ok(reqwest::Client::builder().default_headers(headers).build()?)
}

/// Map a non-success response to an [`ApiError`], passing success through.
pub(crate) async fn expect_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = truncate(&response.text().await.unwrap_or_default());
    match status {
        reqwest::StatusCode::NOT_FOUND => Err(ApiError::NotFound(message)),
        reqwest::StatusCode::CONFLICT => Err(ApiError::Conflict(message)),
        _ => Err(ApiError::Api {
            status: status.as_u16(),
            message,
        }),
    }
}

/// Parse a JSON response body, keeping the raw text for diagnostics.
pub(crate) async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        tracing::error!(error = %e, body = %truncate(&text), "failed to parse service response");
        ApiError::Parse(e.to_string())
    })
}

fn truncate(body: &str) -> String {
    body.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::NotFound("cart for cust_1".to_string());
        assert_eq!(err.to_string(), "not found: cart for cust_1");

        let err = ApiError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 503 - unavailable");
    }

    #[test]
    fn test_truncate_caps_body_length() {
        let long = "x".repeat(2000);
        assert_eq!(truncate(&long).len(), 500);
        assert_eq!(truncate("short"), "short");
    }
}
