//! Persistence access for both cart representations.
//!
//! `CartStore` is pure data access: it knows where carts live and how to
//! read and mutate them, and nothing about merging, migration, or display
//! policy. Guest carts are a local persisted blob; server carts live behind
//! the cart service and get their display fields from the catalog.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use seagrape_core::{CustomerId, Money};

use super::{Cart, CartItem, CartOp};
use crate::api::{CartApi, CartDoc, CatalogApi};
use crate::error::{CheckoutError, Result};
use crate::kv::{StateStore, keys};
use crate::session::Identity;

/// Data access over the guest cart blob and the remote server cart.
#[derive(Clone)]
pub struct CartStore {
    state: StateStore,
    carts: Arc<dyn CartApi>,
    catalog: Arc<dyn CatalogApi>,
    /// Per-customer mutation locks; rapid successive mutations from the same
    /// session must reach the cart service one at a time or they lose
    /// updates.
    locks: Arc<DashMap<CustomerId, Arc<Mutex<()>>>>,
}

impl CartStore {
    /// Create a new cart store.
    pub fn new(state: StateStore, carts: Arc<dyn CartApi>, catalog: Arc<dyn CatalogApi>) -> Self {
        Self {
            state,
            carts,
            catalog,
            locks: Arc::new(DashMap::new()),
        }
    }

    // =========================================================================
    // Guest cart
    // =========================================================================

    /// Read the guest cart. Never fails: missing and corrupt blobs both read
    /// as an empty cart, because broken local state is unrecoverable and an
    /// empty cart display beats no cart display.
    #[must_use]
    pub fn read_guest_cart(&self) -> Cart {
        self.state.get(keys::GUEST_CART).unwrap_or_default()
    }

    /// Write the guest cart. Best-effort: a failed write (storage quota) is
    /// logged, not surfaced, since cart display tolerates staleness.
    pub fn write_guest_cart(&self, cart: &Cart) {
        if let Err(e) = self.state.put(keys::GUEST_CART, cart) {
            tracing::warn!(error = %e, "failed to persist guest cart");
        }
    }

    /// Remove the guest cart blob.
    pub fn clear_guest_cart(&self) {
        self.state.remove(keys::GUEST_CART);
    }

    // =========================================================================
    // Server cart
    // =========================================================================

    /// Fetch the server cart for `identity`.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::Cancelled`] if `token` fires first; no state has
    ///   been touched.
    /// - [`CheckoutError::NotFound`] if the customer has no cart record yet;
    ///   callers treat this as an empty cart.
    /// - [`CheckoutError::Transient`] on network failure.
    #[instrument(skip(self, token), fields(customer = %identity.customer_id))]
    pub async fn fetch_server_cart(
        &self,
        identity: &Identity,
        token: &CancellationToken,
    ) -> Result<Cart> {
        if token.is_cancelled() {
            return Err(CheckoutError::Cancelled);
        }

        tokio::select! {
            () = token.cancelled() => Err(CheckoutError::Cancelled),
            result = self.load_server_cart(identity) => result,
        }
    }

    /// Apply one mutation to the server cart and return the updated cart.
    ///
    /// Mutations are serialized per customer: the lock is held across the
    /// remote call so two rapid double-click adds cannot interleave.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Transient`] on network failure; the caller
    /// reloads the authoritative cart rather than guessing at local repair.
    #[instrument(skip(self, op), fields(customer = %identity.customer_id))]
    pub async fn mutate_server_cart(&self, identity: &Identity, op: &CartOp) -> Result<Cart> {
        let lock = {
            let entry = self
                .locks
                .entry(identity.customer_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(&entry)
        };
        let _guard = lock.lock().await;

        let doc = self.carts.apply(&identity.customer_id, op).await?;
        Ok(self.materialize(doc).await)
    }

    async fn load_server_cart(&self, identity: &Identity) -> Result<Cart> {
        let doc = self.carts.fetch_cart(&identity.customer_id).await?;
        Ok(self.materialize(doc).await)
    }

    /// Turn a wire cart into a display cart, enriching lines from the
    /// catalog. A failed catalog lookup degrades that line's display fields
    /// instead of failing the whole cart.
    async fn materialize(&self, doc: CartDoc) -> Cart {
        if doc.product_ids.len() != doc.quantities.len()
            || doc.product_ids.len() != doc.line_totals.len()
        {
            tracing::warn!(
                products = doc.product_ids.len(),
                quantities = doc.quantities.len(),
                totals = doc.line_totals.len(),
                "server cart arrays disagree on length, truncating to shortest"
            );
        }

        let mut cart = Cart::new();
        let lines = doc
            .product_ids
            .into_iter()
            .zip(doc.quantities)
            .zip(doc.line_totals);

        for ((product_id, quantity), line_total) in lines {
            if quantity == 0 {
                continue;
            }

            let unit_price = Money::new(line_total.amount() / rust_decimal::Decimal::from(quantity))
                .unwrap_or_default();

            let (name, image) = match self.catalog.get_product(&product_id).await {
                Ok(product) => (product.name, product.image),
                Err(e) => {
                    tracing::warn!(
                        product = %product_id,
                        error = %e,
                        "catalog lookup failed, degrading line display"
                    );
                    (product_id.as_str().to_owned(), String::new())
                }
            };

            cart.add_item(CartItem {
                product_id,
                name,
                image,
                unit_price,
                quantity,
            });
        }

        cart
    }
}
