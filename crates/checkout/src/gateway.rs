//! Payment session resolution.
//!
//! After the buyer returns from the gateway's hosted payment page, the only
//! thing the return URL carries is an opaque session reference. The resolver
//! turns that reference into canonical buyer identity and shipping details,
//! fetched exactly once per confirmation attempt and treated as immutable
//! from then on - re-fetching mid-attempt could observe a mutated session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use seagrape_core::{Email, PaymentSessionId};

use crate::api::{ApiError, PaymentSessionApi, PaymentSessionDoc};
use crate::error::{CheckoutError, Result};

/// Lifecycle status of a gateway checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Payment not finished; the buyer may still be on the payment page.
    Open,
    /// Payment completed.
    Complete,
    /// Session timed out or was abandoned.
    Expired,
}

/// A resolved gateway checkout session.
///
/// Read-only: fetched once per confirmation attempt and passed through the
/// rest of the state machine unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    /// Opaque gateway session reference.
    pub id: PaymentSessionId,
    /// Buyer email, if the gateway collected a parseable one.
    pub buyer_email: Option<Email>,
    /// Buyer display name, if collected.
    pub buyer_name: Option<String>,
    /// Shipping address lines, top to bottom.
    pub shipping_address: Vec<String>,
    /// Session status.
    pub status: PaymentStatus,
}

/// Resolves payment-session references against the gateway.
#[derive(Clone)]
pub struct PaymentSessionResolver {
    api: Arc<dyn PaymentSessionApi>,
}

impl PaymentSessionResolver {
    /// Create a new resolver.
    pub fn new(api: Arc<dyn PaymentSessionApi>) -> Self {
        Self { api }
    }

    /// Resolve a payment session.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::SessionNotFound`] if the gateway no longer knows
    ///   the session or reports it expired; the user returns to the cart.
    /// - [`CheckoutError::Transient`] on network failure; safe to retry.
    #[instrument(skip(self), fields(session = %session_id))]
    pub async fn resolve(&self, session_id: &PaymentSessionId) -> Result<PaymentSession> {
        let doc = self
            .api
            .fetch_session(session_id)
            .await
            .map_err(|e| match e {
                ApiError::NotFound(message) => CheckoutError::SessionNotFound(message),
                other => CheckoutError::from(other),
            })?;

        let session = convert_session(session_id.clone(), doc);

        if session.status == PaymentStatus::Expired {
            return Err(CheckoutError::SessionNotFound(format!(
                "payment session {session_id} expired"
            )));
        }

        Ok(session)
    }
}

/// Convert the wire document, dropping malformed buyer emails rather than
/// failing the whole resolution - a missing email only skips the
/// confirmation mail later.
fn convert_session(id: PaymentSessionId, doc: PaymentSessionDoc) -> PaymentSession {
    let buyer_email = doc.buyer_email.as_deref().and_then(|raw| {
        Email::parse(raw)
            .map_err(|e| {
                tracing::warn!(error = %e, "gateway returned unparseable buyer email");
                e
            })
            .ok()
    });

    let status = match doc.status.as_str() {
        "complete" | "paid" => PaymentStatus::Complete,
        "expired" => PaymentStatus::Expired,
        other => {
            if other != "open" {
                tracing::debug!(status = other, "unrecognized session status, treating as open");
            }
            PaymentStatus::Open
        }
    };

    PaymentSession {
        id,
        buyer_email,
        buyer_name: doc.buyer_name,
        shipping_address: doc.shipping_address,
        status,
    }
}
