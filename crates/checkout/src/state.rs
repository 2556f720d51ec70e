//! Engine wiring shared by embedders.
//!
//! `CheckoutState` is the dependency-injection root: it owns the persisted
//! state store, the event bus, and the service clients, and hands out the
//! two components callers talk to (the reconciler and the confirmation
//! engine). It is cheaply cloneable via `Arc`.

use std::sync::Arc;

use crate::api::{
    ApiError, CartApi, CatalogApi, HttpCartClient, HttpCatalogClient, HttpNotificationClient,
    HttpOrderClient, HttpPaymentGatewayClient, NotificationApi, OrderApi, PaymentSessionApi,
};
use crate::bus::EventBus;
use crate::cart::{CartReconciler, CartStore};
use crate::config::CheckoutConfig;
use crate::error::Result;
use crate::gateway::PaymentSessionResolver;
use crate::kv::{StateStore, keys};
use crate::notify::NotificationDispatcher;
use crate::orders::OrderConfirmationEngine;
use crate::session::Identity;

/// The remote service seams the engine is built over.
///
/// Production wiring uses the HTTP clients; tests inject fakes.
pub struct ServiceClients {
    /// Cart service.
    pub carts: Arc<dyn CartApi>,
    /// Catalog service.
    pub catalog: Arc<dyn CatalogApi>,
    /// Order service.
    pub orders: Arc<dyn OrderApi>,
    /// Payment gateway.
    pub payments: Arc<dyn PaymentSessionApi>,
    /// Notification service.
    pub notifications: Arc<dyn NotificationApi>,
}

impl ServiceClients {
    /// Build HTTP clients for every service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any HTTP client fails to build.
    pub fn over_http(config: &CheckoutConfig) -> std::result::Result<Self, ApiError> {
        Ok(Self {
            carts: Arc::new(HttpCartClient::new(
                &config.cart_service_url,
                &config.service_api_key,
            )?),
            catalog: Arc::new(HttpCatalogClient::new(
                &config.catalog_service_url,
                &config.service_api_key,
            )?),
            orders: Arc::new(HttpOrderClient::new(
                &config.order_service_url,
                &config.service_api_key,
            )?),
            payments: Arc::new(HttpPaymentGatewayClient::new(
                &config.payment_gateway_url,
                &config.gateway_secret_key,
            )?),
            notifications: Arc::new(HttpNotificationClient::new(
                &config.notification_service_url,
                &config.service_api_key,
            )?),
        })
    }
}

/// Shared engine state.
#[derive(Clone)]
pub struct CheckoutState {
    inner: Arc<CheckoutStateInner>,
}

struct CheckoutStateInner {
    state: StateStore,
    bus: EventBus,
    reconciler: CartReconciler,
    engine: OrderConfirmationEngine,
}

impl CheckoutState {
    /// Wire the engine over HTTP clients and an in-memory state store.
    ///
    /// Embedders with durable local storage use
    /// [`CheckoutState::with_clients`] and pass their own store.
    ///
    /// # Errors
    ///
    /// Returns an error if any HTTP client fails to build.
    pub fn new(config: &CheckoutConfig) -> std::result::Result<Self, ApiError> {
        Ok(Self::with_clients(
            ServiceClients::over_http(config)?,
            StateStore::in_memory(),
        ))
    }

    /// Wire the engine over injected service clients and state store.
    #[must_use]
    pub fn with_clients(clients: ServiceClients, state: StateStore) -> Self {
        let bus = EventBus::new();
        let cart_store = CartStore::new(state.clone(), clients.carts, clients.catalog);
        let reconciler = CartReconciler::new(cart_store.clone(), bus.clone());
        let engine = OrderConfirmationEngine::new(
            state.clone(),
            PaymentSessionResolver::new(clients.payments),
            cart_store,
            clients.orders,
            NotificationDispatcher::new(clients.notifications),
            bus.clone(),
        );

        Self {
            inner: Arc::new(CheckoutStateInner {
                state,
                bus,
                reconciler,
                engine,
            }),
        }
    }

    /// The unified cart API.
    #[must_use]
    pub fn reconciler(&self) -> &CartReconciler {
        &self.inner.reconciler
    }

    /// The order confirmation engine.
    #[must_use]
    pub fn engine(&self) -> &OrderConfirmationEngine {
        &self.inner.engine
    }

    /// The event bus display components subscribe to.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// The persisted state store.
    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.inner.state
    }

    /// The persisted identity reference, if a sign-in survived the last
    /// restart.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.get(keys::IDENTITY)
    }

    /// Record a sign-in and migrate the guest cart into the server cart.
    ///
    /// The identity is persisted even when migration fails partway; calling
    /// [`CartReconciler::on_identity_established`] again retries only the
    /// unmigrated items.
    ///
    /// # Errors
    ///
    /// Propagates the first migration failure.
    pub async fn sign_in(&self, identity: Identity) -> Result<()> {
        if let Err(e) = self.inner.state.put(keys::IDENTITY, &identity) {
            tracing::warn!(error = %e, "failed to persist identity reference");
        }
        self.inner.reconciler.on_identity_established(&identity).await
    }

    /// Clear the persisted identity and drop authenticated cart state.
    pub async fn sign_out(&self) {
        self.inner.state.remove(keys::IDENTITY);
        self.inner.reconciler.on_identity_cleared().await;
    }
}
