//! Order snapshots, confirmation records, and the confirmation engine.

mod confirmation;

pub use confirmation::{ConfirmationOutcome, ConfirmationPhase, OrderConfirmationEngine};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use seagrape_core::{Email, Money, OrderId, PaymentSessionId};

use crate::cart::{Cart, CartItem};
use crate::error::{CheckoutError, Result};
use crate::session::SessionKind;

/// Immutable copy of a cart taken when checkout is initiated.
///
/// Lives in the pending-snapshot slot for its session kind between
/// "checkout initiated" and "order confirmed", and is deleted once
/// confirmation succeeds or the checkout is abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrderSnapshot {
    /// Session kind the snapshot was captured under.
    pub kind: SessionKind,
    /// Cart lines at capture time.
    pub items: Vec<CartItem>,
    /// Cart subtotal at capture time.
    pub total: Money,
    /// Capture timestamp.
    pub captured_at: DateTime<Utc>,
}

impl PendingOrderSnapshot {
    /// Capture the current cart contents.
    #[must_use]
    pub fn capture(kind: SessionKind, cart: &Cart) -> Self {
        Self {
            kind,
            items: cart.items().to_vec(),
            total: cart.subtotal(),
            captured_at: Utc::now(),
        }
    }

    /// Check the snapshot is convertible into an order.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Validation`] if the snapshot has no items, a
    /// zero-quantity line, or a total that disagrees with its lines.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(CheckoutError::Validation(
                "pending snapshot has no items".to_string(),
            ));
        }

        if let Some(line) = self.items.iter().find(|item| item.quantity == 0) {
            return Err(CheckoutError::Validation(format!(
                "pending snapshot line {} has zero quantity",
                line.product_id
            )));
        }

        let computed: Money = self.items.iter().map(CartItem::line_total).sum();
        if computed != self.total {
            return Err(CheckoutError::Validation(format!(
                "pending snapshot total {} disagrees with line totals {computed}",
                self.total
            )));
        }

        Ok(())
    }
}

/// An order this engine confirmed.
///
/// Originated here, owned by the order-history subsystem once persisted
/// remotely; kept locally only to re-render the confirmation view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedOrder {
    /// Order ID assigned by the order service.
    pub order_id: OrderId,
    /// Buyer email from the payment session, if any.
    pub buyer_email: Option<Email>,
    /// Purchased lines.
    pub line_items: Vec<CartItem>,
    /// Order total.
    pub total: Money,
    /// Creation timestamp from the order service.
    pub created_at: DateTime<Utc>,
    /// Display-only confirmation code. Regenerated on every attempt; dedupe
    /// is keyed by the payment session, never by this.
    pub confirmation_code: String,
}

/// Cached confirmed order, tagged with the payment session that produced it
/// so a replay for a different session cannot serve the wrong order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ConfirmedOrderRecord {
    pub payment_session_id: PaymentSessionId,
    pub order: ConfirmedOrder,
}

/// Characters used in confirmation codes; ambiguous glyphs excluded.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 8;

/// Generate a display confirmation code (e.g., `SG-7KQ2MWPA`).
#[must_use]
pub fn generate_confirmation_code() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let code: String = (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET.get(idx).copied().map_or('X', char::from)
        })
        .collect();
    format!("SG-{code}")
}
