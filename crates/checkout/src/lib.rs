//! Seagrape Checkout - cart reconciliation and idempotent order confirmation.
//!
//! This crate is the core of the Seagrape storefront's checkout path. It
//! tracks one logical shopping cart across two divergent backends (a
//! locally persisted guest cart and a server cart owned by an authenticated
//! customer), migrates between them as identity state changes, and converts
//! a completed payment session into exactly one persisted order even though
//! confirmation may be invoked many times.
//!
//! # Architecture
//!
//! - Remote services (cart, catalog, order, payment gateway, notification)
//!   sit behind async traits in [`api`]; production uses the bundled
//!   `reqwest` clients, tests inject fakes.
//! - Small durable records live in an injected key-value store ([`kv`]);
//!   idempotency comes from the dedupe-marker design, not locking.
//! - Display components refresh off the [`bus`] signals instead of polling.
//!
//! # Example
//!
//! ```rust,ignore
//! use seagrape_checkout::{CheckoutConfig, CheckoutState};
//!
//! let config = CheckoutConfig::from_env()?;
//! let checkout = CheckoutState::new(&config)?;
//!
//! // Build a cart, start checkout, hand the buyer to the gateway...
//! let cart = checkout.reconciler().current_cart(None, &token).await?;
//! checkout.engine().begin_checkout(None, &cart)?;
//!
//! // ...and confirm on return. Reloading this page re-runs confirm() with
//! // the same session ID and replays the same order.
//! let outcome = checkout.engine().confirm(None, &session_id).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod bus;
pub mod cart;
pub mod config;
pub mod error;
pub mod gateway;
pub mod kv;
pub mod notify;
pub mod orders;
pub mod session;
pub mod state;

pub use bus::{CheckoutEvent, EventBus};
pub use cart::{Cart, CartItem, CartOp, CartReconciler, CartStore};
pub use config::{CheckoutConfig, ConfigError};
pub use error::{CheckoutError, Result};
pub use gateway::{PaymentSession, PaymentSessionResolver, PaymentStatus};
pub use kv::{KvStore, MemoryKvStore, StateStore};
pub use notify::{EmailOutcome, NotificationDispatcher};
pub use orders::{
    ConfirmationOutcome, ConfirmationPhase, ConfirmedOrder, OrderConfirmationEngine,
    PendingOrderSnapshot, generate_confirmation_code,
};
pub use session::{Identity, SessionKind};
pub use state::{CheckoutState, ServiceClients};
