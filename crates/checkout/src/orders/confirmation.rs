//! Idempotent order confirmation.
//!
//! Converting a completed payment session into an order is side-effecting
//! and non-idempotent on the remote side, yet the caller may invoke it any
//! number of times: page reloads, back-navigation, duplicate event firing.
//! The engine provides an at-most-once guarantee from client-observable
//! signals alone.
//!
//! # State machine
//!
//! `Idle -> Resolving -> Converting -> Persisting -> Notifying -> Done`,
//! with a terminal `Skipped` state taken immediately when the dedupe marker
//! for the payment session is already set. The `Skipped` path returns a view
//! of the already-confirmed order from the local cache, so a repeated visit
//! renders identically - observable idempotence, not merely "don't
//! double-charge".
//!
//! # The dedupe marker
//!
//! The marker keyed by `{session kind, payment session}` is the single
//! source of truth for "this payment session already produced an order". It
//! is set right after the create call is dispatched, not after it resolves:
//! the race this engine defends against is the same context re-running
//! confirmation at a suspension point, not a true concurrent network race.
//! On create failure the marker is removed again, leaving a user-initiated
//! retry safe (snapshot intact, no marker). A true cross-tab race remains
//! possible; the order service's per-session idempotent create is the
//! backstop there, and conflict responses count as success.

use core::fmt;
use std::sync::Arc;

use tracing::instrument;

use seagrape_core::PaymentSessionId;

use super::{ConfirmedOrder, ConfirmedOrderRecord, PendingOrderSnapshot, generate_confirmation_code};
use crate::api::{OrderApi, OrderCreatedDoc, OrderDraftDoc, OrderLineDoc};
use crate::bus::{CheckoutEvent, EventBus};
use crate::cart::{Cart, CartStore};
use crate::error::{CheckoutError, Result};
use crate::gateway::{PaymentSessionResolver, PaymentStatus};
use crate::kv::{StateStore, keys};
use crate::notify::{EmailOutcome, NotificationDispatcher};
use crate::session::{Identity, SessionKind};

/// Phases of one confirmation attempt, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPhase {
    /// Attempt accepted, dedupe marker not yet checked.
    Idle,
    /// Fetching the payment session.
    Resolving,
    /// Loading and validating the pending snapshot.
    Converting,
    /// Dispatching the order create.
    Persisting,
    /// Best-effort confirmation email.
    Notifying,
    /// Order confirmed and cached.
    Done,
    /// Marker already set; cached view served, no remote calls.
    Skipped,
}

impl fmt::Display for ConfirmationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Converting => "converting",
            Self::Persisting => "persisting",
            Self::Notifying => "notifying",
            Self::Done => "done",
            Self::Skipped => "skipped",
        };
        write!(f, "{name}")
    }
}

/// Result of a confirmation call.
#[derive(Debug, Clone)]
pub struct ConfirmationOutcome {
    /// The confirmed order, freshly created or replayed from cache.
    pub order: ConfirmedOrder,
    /// Whether this call performed the create. `false` on the `Skipped`
    /// path.
    pub newly_created: bool,
    /// What happened to the confirmation email. Always `Skipped` on replay;
    /// `Failed` is a soft warning only, the order stands.
    pub email: EmailOutcome,
}

/// Converts a pending snapshot plus a resolved payment session into exactly
/// one persisted order.
#[derive(Clone)]
pub struct OrderConfirmationEngine {
    state: StateStore,
    resolver: PaymentSessionResolver,
    cart_store: CartStore,
    orders: Arc<dyn OrderApi>,
    notifier: NotificationDispatcher,
    bus: EventBus,
}

impl OrderConfirmationEngine {
    /// Create a new engine.
    pub fn new(
        state: StateStore,
        resolver: PaymentSessionResolver,
        cart_store: CartStore,
        orders: Arc<dyn OrderApi>,
        notifier: NotificationDispatcher,
        bus: EventBus,
    ) -> Self {
        Self {
            state,
            resolver,
            cart_store,
            orders,
            notifier,
            bus,
        }
    }

    /// Capture the cart into the pending slot for this session kind.
    ///
    /// Called when checkout is initiated, before handing the buyer to the
    /// payment gateway.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::Validation`] on an empty cart, or
    /// [`CheckoutError::Transient`] if the snapshot cannot be persisted.
    #[instrument(skip(self, identity, cart), fields(kind = %SessionKind::of(identity)))]
    pub fn begin_checkout(
        &self,
        identity: Option<&Identity>,
        cart: &Cart,
    ) -> Result<PendingOrderSnapshot> {
        if cart.is_empty() {
            return Err(CheckoutError::Validation(
                "cannot start checkout with an empty cart".to_string(),
            ));
        }

        let kind = SessionKind::of(identity);
        let snapshot = PendingOrderSnapshot::capture(kind, cart);
        self.state
            .put(keys::pending_snapshot(kind), &snapshot)
            .map_err(|e| CheckoutError::Transient(e.to_string()))?;

        tracing::info!(items = snapshot.items.len(), total = %snapshot.total, "checkout initiated");
        Ok(snapshot)
    }

    /// Discard the pending snapshot for this session kind, if any.
    pub fn abandon_checkout(&self, identity: Option<&Identity>) {
        self.state
            .remove(keys::pending_snapshot(SessionKind::of(identity)));
    }

    /// The pending snapshot for this session kind, if one exists.
    #[must_use]
    pub fn pending_snapshot(&self, identity: Option<&Identity>) -> Option<PendingOrderSnapshot> {
        self.state.get(keys::pending_snapshot(SessionKind::of(identity)))
    }

    /// Confirm the order for a completed payment session.
    ///
    /// Invoking this again with the same payment session returns the cached
    /// view of the already-confirmed order without a second create call.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::SessionNotFound`] - session expired or unknown;
    ///   retry from the cart.
    /// - [`CheckoutError::Validation`] - nothing to confirm (no pending
    ///   snapshot) or a malformed one; the checkout flow was entered without
    ///   a valid cart.
    /// - [`CheckoutError::Transient`] - create failed; marker removed,
    ///   snapshot intact, retry safe.
    /// - [`CheckoutError::NotFound`] - marker set but the cached order is
    ///   gone (cleared storage); nothing is created.
    #[instrument(
        skip(self, identity),
        fields(session = %payment_session_id, kind = %SessionKind::of(identity))
    )]
    pub async fn confirm(
        &self,
        identity: Option<&Identity>,
        payment_session_id: &PaymentSessionId,
    ) -> Result<ConfirmationOutcome> {
        let kind = SessionKind::of(identity);
        let marker_key = keys::dedupe_marker(kind, payment_session_id);

        // Idle -> Skipped
        if self.state.flag(&marker_key) {
            tracing::debug!(phase = %ConfirmationPhase::Skipped, "payment session already confirmed");
            return self.replay_confirmed(payment_session_id);
        }

        // Idle -> Resolving. The session is fetched once and passed through
        // the rest of the attempt; failures here set no marker.
        tracing::debug!(phase = %ConfirmationPhase::Resolving, "fetching payment session");
        let session = self.resolver.resolve(payment_session_id).await?;
        if session.status == PaymentStatus::Open {
            return Err(CheckoutError::Validation(format!(
                "payment session {payment_session_id} has not completed payment"
            )));
        }

        // Resolving -> Converting. A missing snapshot means the checkout
        // flow was entered without a valid cart; surfaced, not ignored.
        tracing::debug!(phase = %ConfirmationPhase::Converting, "loading pending snapshot");
        let snapshot: PendingOrderSnapshot =
            self.state.get(keys::pending_snapshot(kind)).ok_or_else(|| {
                CheckoutError::Validation("no pending checkout snapshot to confirm".to_string())
            })?;
        snapshot.validate()?;

        // Converting -> Persisting
        tracing::debug!(phase = %ConfirmationPhase::Persisting, "creating order");
        let confirmation_code = generate_confirmation_code();
        let draft = OrderDraftDoc {
            payment_session_id: payment_session_id.clone(),
            lines: snapshot
                .items
                .iter()
                .map(|item| OrderLineDoc {
                    product_id: item.product_id.clone(),
                    name: item.name.clone(),
                    image: item.image.clone(),
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                })
                .collect(),
            total: snapshot.total,
        };

        // Marker goes down before the create is awaited: a re-entrant call
        // arriving at the next suspension point must take the Skipped path
        // rather than dispatch a second create.
        if let Err(e) = self.state.set_flag(&marker_key) {
            tracing::warn!(error = %e, "failed to persist dedupe marker before create");
        }

        let created = match self.create_order(identity, &draft).await {
            Ok(created) => created,
            Err(e @ CheckoutError::Conflict(_)) => {
                // The remote side already holds this order. It is
                // authoritative, so the marker stays; only the cached view
                // can answer repeat visits now.
                tracing::warn!(error = %e, "order service reports duplicate for payment session");
                return Err(e);
            }
            Err(e) => {
                // Leave the system retry-safe: no marker, snapshot intact.
                self.state.remove(&marker_key);
                return Err(e);
            }
        };

        let order = ConfirmedOrder {
            order_id: created.order_id,
            buyer_email: session.buyer_email.clone(),
            line_items: snapshot.items,
            total: snapshot.total,
            created_at: created.created_at,
            confirmation_code,
        };

        // Persisting -> Notifying
        tracing::debug!(phase = %ConfirmationPhase::Notifying, order = %order.order_id, "order created");
        self.state.remove(keys::pending_snapshot(kind));
        if kind == SessionKind::Guest {
            self.cart_store.clear_guest_cart();
        }
        self.bus.publish(CheckoutEvent::CartUpdated);

        let email = self.notifier.send_confirmation(&session, &order).await;

        // Notifying -> Done
        self.bus.publish(CheckoutEvent::OrderUpdated);
        let record = ConfirmedOrderRecord {
            payment_session_id: payment_session_id.clone(),
            order: order.clone(),
        };
        if let Err(e) = self.state.put(keys::LAST_CONFIRMED_ORDER, &record) {
            tracing::warn!(error = %e, "failed to cache confirmed order for replay");
        }

        tracing::info!(
            phase = %ConfirmationPhase::Done,
            order = %order.order_id,
            total = %order.total,
            "order confirmed"
        );
        Ok(ConfirmationOutcome {
            order,
            newly_created: true,
            email,
        })
    }

    /// Serve the cached view for an already-confirmed payment session.
    fn replay_confirmed(&self, payment_session_id: &PaymentSessionId) -> Result<ConfirmationOutcome> {
        let record: ConfirmedOrderRecord = self
            .state
            .get(keys::LAST_CONFIRMED_ORDER)
            .filter(|record: &ConfirmedOrderRecord| {
                &record.payment_session_id == payment_session_id
            })
            .ok_or_else(|| {
                CheckoutError::NotFound(format!(
                    "payment session {payment_session_id} is confirmed but its order view is gone"
                ))
            })?;

        Ok(ConfirmationOutcome {
            order: record.order,
            newly_created: false,
            email: EmailOutcome::Skipped,
        })
    }

    async fn create_order(
        &self,
        identity: Option<&Identity>,
        draft: &OrderDraftDoc,
    ) -> Result<OrderCreatedDoc> {
        let created = match identity {
            Some(identity) => {
                self.orders
                    .create_for_customer(&identity.customer_id, draft)
                    .await?
            }
            None => self.orders.create_guest(draft).await?,
        };
        Ok(created)
    }
}
