//! Best-effort order confirmation email.
//!
//! Decoupled from order persistence on purpose: by the time this runs the
//! order stands, and nothing that happens here may roll it back or create a
//! second one. Failures are logged and reported as a soft outcome only.

use std::sync::Arc;

use tracing::instrument;

use seagrape_core::Email;

use crate::api::{ConfirmationEmailDoc, NotificationApi};
use crate::gateway::PaymentSession;
use crate::orders::ConfirmedOrder;

/// Addresses the gateway substitutes when the buyer supplied none. Sending
/// to these is pointless, so the dispatcher skips them; that is a valid
/// outcome, not an error.
const PLACEHOLDER_EMAILS: &[&str] = &["guest@example.com", "no-reply@example.com"];

/// What happened to the confirmation email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailOutcome {
    /// Queued with the notification service.
    Sent,
    /// No usable recipient address; nothing was attempted.
    Skipped,
    /// The send failed; already logged, the order stands regardless.
    Failed,
}

/// Dispatches order-confirmation emails.
#[derive(Clone)]
pub struct NotificationDispatcher {
    api: Arc<dyn NotificationApi>,
}

impl NotificationDispatcher {
    /// Create a new dispatcher.
    pub fn new(api: Arc<dyn NotificationApi>) -> Self {
        Self { api }
    }

    /// Send the confirmation email for an order, best-effort.
    ///
    /// Awaited for logging purposes only; the returned outcome is a display
    /// hint, never a reason to revisit the order.
    #[instrument(skip(self, session, order), fields(order = %order.order_id))]
    pub async fn send_confirmation(
        &self,
        session: &PaymentSession,
        order: &ConfirmedOrder,
    ) -> EmailOutcome {
        let Some(email) = &order.buyer_email else {
            tracing::debug!("no buyer email on order, skipping confirmation mail");
            return EmailOutcome::Skipped;
        };

        if is_placeholder(email) {
            tracing::debug!(email = %email, "placeholder buyer email, skipping confirmation mail");
            return EmailOutcome::Skipped;
        }

        let doc = ConfirmationEmailDoc {
            to: email.as_str().to_owned(),
            name: session.buyer_name.clone().unwrap_or_default(),
            order_id: order.order_id.clone(),
            confirmation_code: order.confirmation_code.clone(),
        };

        match self.api.send_confirmation(&doc).await {
            Ok(()) => {
                tracing::info!(to = %email, "confirmation email queued");
                EmailOutcome::Sent
            }
            Err(e) => {
                tracing::warn!(
                    to = %email,
                    error = %e,
                    "confirmation email failed, order stands"
                );
                EmailOutcome::Failed
            }
        }
    }
}

fn is_placeholder(email: &Email) -> bool {
    PLACEHOLDER_EMAILS
        .iter()
        .any(|placeholder| email.as_str().eq_ignore_ascii_case(placeholder))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use seagrape_core::{Money, OrderId, PaymentSessionId};

    use super::*;
    use crate::api::ApiError;
    use crate::gateway::PaymentStatus;

    #[derive(Default)]
    struct CountingNotifier {
        sends: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl NotificationApi for CountingNotifier {
        async fn send_confirmation(
            &self,
            _doc: &ConfirmationEmailDoc,
        ) -> std::result::Result<(), ApiError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ApiError::Api {
                    status: 500,
                    message: "smtp down".to_string(),
                });
            }
            Ok(())
        }
    }

    fn session(email: Option<&str>) -> PaymentSession {
        PaymentSession {
            id: PaymentSessionId::new("sess_1"),
            buyer_email: email.map(|e| Email::parse(e).unwrap()),
            buyer_name: Some("Alex Buyer".to_string()),
            shipping_address: vec![],
            status: PaymentStatus::Complete,
        }
    }

    fn order(email: Option<&str>) -> ConfirmedOrder {
        ConfirmedOrder {
            order_id: OrderId::new("ord_1"),
            buyer_email: email.map(|e| Email::parse(e).unwrap()),
            line_items: vec![],
            total: Money::ZERO,
            created_at: Utc::now(),
            confirmation_code: "SG-TEST0001".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sends_to_real_address() {
        let notifier = Arc::new(CountingNotifier::default());
        let dispatcher = NotificationDispatcher::new(Arc::clone(&notifier) as Arc<dyn NotificationApi>);

        let outcome = dispatcher
            .send_confirmation(&session(Some("buyer@example.com")), &order(Some("buyer@example.com")))
            .await;

        assert_eq!(outcome, EmailOutcome::Sent);
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skips_missing_and_placeholder_addresses() {
        let notifier = Arc::new(CountingNotifier::default());
        let dispatcher = NotificationDispatcher::new(Arc::clone(&notifier) as Arc<dyn NotificationApi>);

        let outcome = dispatcher
            .send_confirmation(&session(None), &order(None))
            .await;
        assert_eq!(outcome, EmailOutcome::Skipped);

        let outcome = dispatcher
            .send_confirmation(
                &session(Some("guest@example.com")),
                &order(Some("guest@example.com")),
            )
            .await;
        assert_eq!(outcome, EmailOutcome::Skipped);

        assert_eq!(notifier.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_is_soft() {
        let notifier = Arc::new(CountingNotifier {
            fail: true,
            ..CountingNotifier::default()
        });
        let dispatcher = NotificationDispatcher::new(Arc::clone(&notifier) as Arc<dyn NotificationApi>);

        let outcome = dispatcher
            .send_confirmation(&session(Some("buyer@example.com")), &order(Some("buyer@example.com")))
            .await;

        assert_eq!(outcome, EmailOutcome::Failed);
    }
}
