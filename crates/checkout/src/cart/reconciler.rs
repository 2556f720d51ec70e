//! One logical cart over two storage backends.
//!
//! The reconciler presents a single read/mutate API regardless of identity
//! state: guest sessions hit the local blob, authenticated sessions hit the
//! cart service. At sign-in, guest contents migrate into the server cart
//! exactly once, item by item, summing quantities with whatever the server
//! cart already holds.
//!
//! # Optimistic mutations
//!
//! Every user-visible mutation of the server cart runs a small state machine
//! (`Clean -> Optimistic -> Reconciling`): the display copy is edited
//! immediately, reads are served from it while the remote call is in flight
//! (this is what suppresses the refresh storm right after a mutation), and
//! on remote failure the optimistic change is discarded in favor of a full
//! reload. The rule is "trust the server after any failure" - concurrent
//! mutations make manual rollback of the optimistic diff unsafe.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use seagrape_core::ProductId;

use super::{Cart, CartItem, CartOp, CartStore};
use crate::bus::{CheckoutEvent, EventBus};
use crate::error::{CheckoutError, Result};
use crate::session::Identity;

/// Synchronization state of the authenticated display cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    /// Display copy matches the last authoritative read.
    Clean,
    /// A local edit is ahead of the server; reads serve the display copy.
    Optimistic,
    /// A failed mutation is being repaired by reloading from the server.
    Reconciling,
}

#[derive(Debug)]
struct ReconcilerInner {
    /// Cached display copy of the authenticated cart.
    display: Option<Cart>,
    sync: SyncState,
}

/// Unified cart API over the guest and server representations.
#[derive(Clone)]
pub struct CartReconciler {
    store: CartStore,
    bus: EventBus,
    inner: Arc<Mutex<ReconcilerInner>>,
}

impl CartReconciler {
    /// Create a new reconciler.
    #[must_use]
    pub fn new(store: CartStore, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            inner: Arc::new(Mutex::new(ReconcilerInner {
                display: None,
                sync: SyncState::Clean,
            })),
        }
    }

    /// The store this reconciler reads and writes through.
    #[must_use]
    pub const fn store(&self) -> &CartStore {
        &self.store
    }

    /// The current logical cart for the given identity state.
    ///
    /// Authenticated reads refresh from the cart service unless an
    /// optimistic mutation is in flight, in which case the display copy is
    /// served so stale server data cannot overwrite the local edit.
    /// An identity with no cart record yet reads as an empty cart.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::Cancelled`] if `token` fires, or
    /// [`CheckoutError::Transient`] on network failure.
    #[instrument(skip(self, identity, token), fields(authenticated = identity.is_some()))]
    pub async fn current_cart(
        &self,
        identity: Option<&Identity>,
        token: &CancellationToken,
    ) -> Result<Cart> {
        let Some(identity) = identity else {
            return Ok(self.store.read_guest_cart());
        };

        {
            let inner = self.inner.lock().await;
            if inner.sync == SyncState::Optimistic
                && let Some(cart) = &inner.display
            {
                tracing::debug!("serving optimistic display copy, refresh suppressed");
                return Ok(cart.clone());
            }
        }

        let cart = match self.store.fetch_server_cart(identity, token).await {
            Ok(cart) => cart,
            // No cart record yet is an empty cart, not an error
            Err(CheckoutError::NotFound(_)) => Cart::new(),
            Err(e) => return Err(e),
        };

        let mut inner = self.inner.lock().await;
        // A mutation may have gone optimistic while this read was in
        // flight; its copy wins over this now-stale response.
        if inner.sync == SyncState::Clean {
            inner.display = Some(cart.clone());
        }
        Ok(cart)
    }

    /// Add an item to the current logical cart.
    ///
    /// # Errors
    ///
    /// Authenticated adds surface remote failures after the display copy has
    /// been reconciled; guest adds never fail.
    pub async fn add_item(&self, identity: Option<&Identity>, item: CartItem) -> Result<Cart> {
        let Some(identity) = identity else {
            let mut cart = self.store.read_guest_cart();
            cart.add_item(item);
            self.store.write_guest_cart(&cart);
            self.bus.publish(CheckoutEvent::CartUpdated);
            return Ok(cart);
        };

        let op = CartOp::Add {
            product_id: item.product_id.clone(),
            quantity: item.quantity,
            line_total: item.line_total(),
        };
        self.apply_authenticated(identity, op, move |cart| cart.add_item(item))
            .await
    }

    /// Set the quantity of a line in the current logical cart. Zero removes
    /// the line.
    ///
    /// # Errors
    ///
    /// Same contract as [`CartReconciler::add_item`].
    pub async fn set_quantity(
        &self,
        identity: Option<&Identity>,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        let Some(identity) = identity else {
            let mut cart = self.store.read_guest_cart();
            cart.set_quantity(product_id, quantity);
            self.store.write_guest_cart(&cart);
            self.bus.publish(CheckoutEvent::CartUpdated);
            return Ok(cart);
        };

        let op = if quantity == 0 {
            CartOp::Remove {
                product_id: product_id.clone(),
            }
        } else {
            CartOp::SetQuantity {
                product_id: product_id.clone(),
                quantity,
            }
        };
        let product_id = product_id.clone();
        self.apply_authenticated(identity, op, move |cart| {
            cart.set_quantity(&product_id, quantity);
        })
        .await
    }

    /// Remove a line from the current logical cart.
    ///
    /// # Errors
    ///
    /// Same contract as [`CartReconciler::add_item`].
    pub async fn remove_item(
        &self,
        identity: Option<&Identity>,
        product_id: &ProductId,
    ) -> Result<Cart> {
        let Some(identity) = identity else {
            let mut cart = self.store.read_guest_cart();
            cart.remove(product_id);
            self.store.write_guest_cart(&cart);
            self.bus.publish(CheckoutEvent::CartUpdated);
            return Ok(cart);
        };

        let op = CartOp::Remove {
            product_id: product_id.clone(),
        };
        let product_id = product_id.clone();
        self.apply_authenticated(identity, op, move |cart| cart.remove(&product_id))
            .await
    }

    /// Migrate guest cart contents into the server cart at sign-in.
    ///
    /// Items are added one at a time; each successful add immediately
    /// rewrites the guest blob without that item, so a mid-migration failure
    /// leaves exactly the unmigrated tail for the next attempt. `Add` means
    /// "increase quantity", so a retry never double-adds an item that
    /// already made it across, and a product present in both carts ends up
    /// with the summed quantity - items are never silently discarded.
    ///
    /// # Errors
    ///
    /// Returns the first remote failure; the guest cart then holds only the
    /// items that did not migrate.
    #[instrument(skip(self, identity), fields(customer = %identity.customer_id))]
    pub async fn on_identity_established(&self, identity: &Identity) -> Result<()> {
        let guest = self.store.read_guest_cart();

        if !guest.is_empty() {
            let mut remaining = guest.clone();
            for item in guest.items() {
                let op = CartOp::Add {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    line_total: item.line_total(),
                };
                match self.store.mutate_server_cart(identity, &op).await {
                    Ok(_) => {
                        remaining.remove(&item.product_id);
                        self.store.write_guest_cart(&remaining);
                    }
                    Err(e) => {
                        tracing::warn!(
                            product = %item.product_id,
                            error = %e,
                            migrated = guest.items().len() - remaining.items().len(),
                            "cart migration interrupted, unmigrated items stay in guest cart"
                        );
                        return Err(e);
                    }
                }
            }
            self.store.clear_guest_cart();
        }

        self.invalidate().await;
        self.bus.publish(CheckoutEvent::CartUpdated);
        Ok(())
    }

    /// Drop authenticated cart state when the identity goes away.
    pub async fn on_identity_cleared(&self) {
        self.invalidate().await;
    }

    /// Invalidate the cached display copy; the next read refetches.
    pub async fn invalidate(&self) {
        let mut inner = self.inner.lock().await;
        inner.display = None;
        inner.sync = SyncState::Clean;
    }

    /// The optimistic mutation sequence: apply locally, suppress refreshes,
    /// issue the remote call, and on failure reload the authoritative cart
    /// instead of rolling back the diff.
    async fn apply_authenticated(
        &self,
        identity: &Identity,
        op: CartOp,
        edit: impl FnOnce(&mut Cart),
    ) -> Result<Cart> {
        {
            let mut inner = self.inner.lock().await;
            let mut display = inner.display.clone().unwrap_or_default();
            edit(&mut display);
            inner.display = Some(display);
            inner.sync = SyncState::Optimistic;
        }

        match self.store.mutate_server_cart(identity, &op).await {
            Ok(server_cart) => {
                {
                    let mut inner = self.inner.lock().await;
                    inner.display = Some(server_cart.clone());
                    inner.sync = SyncState::Clean;
                }
                self.bus.publish(CheckoutEvent::CartUpdated);
                Ok(server_cart)
            }
            Err(e) => {
                {
                    let mut inner = self.inner.lock().await;
                    inner.sync = SyncState::Reconciling;
                }

                let token = CancellationToken::new();
                let authoritative = match self.store.fetch_server_cart(identity, &token).await {
                    Ok(cart) => Some(cart),
                    Err(CheckoutError::NotFound(_)) => Some(Cart::new()),
                    Err(reload_err) => {
                        tracing::warn!(
                            error = %reload_err,
                            "authoritative reload after failed mutation also failed"
                        );
                        None
                    }
                };

                {
                    let mut inner = self.inner.lock().await;
                    inner.display = authoritative;
                    inner.sync = SyncState::Clean;
                }
                self.bus.publish(CheckoutEvent::CartUpdated);
                Err(e)
            }
        }
    }
}
