//! Integration tests for Seagrape.
//!
//! Every remote seam of the checkout engine is swapped for the in-process
//! fakes in this crate - no network, no external services. Tests under
//! `tests/` drive the public `CheckoutState` API end to end.
//!
//! The fakes deliberately mirror the real service contracts: the cart
//! service's `Add` increments quantities, the order service is idempotent
//! per payment session, and customers without a cart record read as 404.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use seagrape_checkout::api::{
    ApiError, CartApi, CartDoc, CatalogApi, ConfirmationEmailDoc, NotificationApi, OrderApi,
    OrderCreatedDoc, OrderDraftDoc, PaymentSessionApi, PaymentSessionDoc, ProductDoc,
};
use seagrape_checkout::{CartItem, CartOp, CheckoutState, Identity, ServiceClients, StateStore};
use seagrape_core::{CustomerId, Email, Money, OrderId, PaymentSessionId, ProductId};

type Line = (ProductId, u32, Money);

// =============================================================================
// Cart service fake
// =============================================================================

/// In-process cart service. `Add` increments quantities; a customer without
/// a cart record reads as 404 until the first mutation creates one.
#[derive(Default)]
pub struct FakeCartService {
    carts: Mutex<HashMap<String, Vec<Line>>>,
    /// Fail this many upcoming mutations with a 503.
    pub fail_ops: AtomicUsize,
    /// Artificial latency per fetch, for cancellation tests.
    pub fetch_delay_ms: AtomicU64,
}

impl FakeCartService {
    /// Seed one line into a customer's cart.
    pub fn seed_line(&self, customer: &str, product: &str, quantity: u32, line_total: Money) {
        let mut carts = self.carts.lock().expect("cart fake lock");
        carts
            .entry(customer.to_owned())
            .or_default()
            .push((ProductId::new(product), quantity, line_total));
    }

    /// Current quantity of a product in a customer's cart.
    pub fn quantity_of(&self, customer: &str, product: &str) -> Option<u32> {
        let carts = self.carts.lock().expect("cart fake lock");
        carts.get(customer).and_then(|lines| {
            lines
                .iter()
                .find(|(id, _, _)| id.as_str() == product)
                .map(|(_, qty, _)| *qty)
        })
    }

    fn doc_for(lines: &[Line]) -> CartDoc {
        CartDoc {
            product_ids: lines.iter().map(|(id, _, _)| id.clone()).collect(),
            quantities: lines.iter().map(|(_, qty, _)| *qty).collect(),
            line_totals: lines.iter().map(|(_, _, total)| *total).collect(),
        }
    }
}

#[async_trait]
impl CartApi for FakeCartService {
    async fn fetch_cart(&self, customer_id: &CustomerId) -> Result<CartDoc, ApiError> {
        let delay = self.fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let carts = self.carts.lock().expect("cart fake lock");
        carts
            .get(customer_id.as_str())
            .map(|lines| Self::doc_for(lines))
            .ok_or_else(|| ApiError::NotFound(format!("no cart for {customer_id}")))
    }

    async fn apply(&self, customer_id: &CustomerId, op: &CartOp) -> Result<CartDoc, ApiError> {
        if self
            .fail_ops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ApiError::Api {
                status: 503,
                message: "cart service unavailable".to_string(),
            });
        }

        let mut carts = self.carts.lock().expect("cart fake lock");
        let lines = carts.entry(customer_id.as_str().to_owned()).or_default();
        match op {
            CartOp::Add {
                product_id,
                quantity,
                line_total,
            } => {
                if let Some(line) = lines.iter_mut().find(|(id, _, _)| id == product_id) {
                    line.1 += quantity;
                    line.2 = line.2 + *line_total;
                } else {
                    lines.push((product_id.clone(), *quantity, *line_total));
                }
            }
            CartOp::SetQuantity {
                product_id,
                quantity,
            } => {
                if let Some(line) = lines.iter_mut().find(|(id, _, _)| id == product_id) {
                    let unit = line.2.amount() / rust_decimal::Decimal::from(line.1);
                    line.1 = *quantity;
                    line.2 = Money::new(unit * rust_decimal::Decimal::from(*quantity))
                        .unwrap_or_default();
                }
            }
            CartOp::Remove { product_id } => {
                lines.retain(|(id, _, _)| id != product_id);
            }
        }
        Ok(Self::doc_for(lines))
    }
}

// =============================================================================
// Catalog fake
// =============================================================================

/// Catalog that knows every product by a derived display name.
pub struct FakeCatalog;

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn get_product(&self, product_id: &ProductId) -> Result<ProductDoc, ApiError> {
        Ok(ProductDoc {
            name: format!("Product {product_id}"),
            image: format!("https://cdn.seagrape.test/{product_id}.jpg"),
        })
    }
}

// =============================================================================
// Order service fake
// =============================================================================

/// Order service honoring the idempotent-create contract: one order per
/// payment session, repeats return the existing record.
#[derive(Default)]
pub struct FakeOrderService {
    /// Number of orders actually created (idempotent replays not counted).
    pub creates: AtomicUsize,
    /// Fail the next create with a 503.
    pub fail_next: AtomicBool,
    by_session: Mutex<Vec<(PaymentSessionId, OrderCreatedDoc)>>,
}

impl FakeOrderService {
    fn create(&self, draft: &OrderDraftDoc) -> Result<OrderCreatedDoc, ApiError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ApiError::Api {
                status: 503,
                message: "order service unavailable".to_string(),
            });
        }

        let mut by_session = self.by_session.lock().expect("order fake lock");
        if let Some((_, existing)) = by_session
            .iter()
            .find(|(session, _)| session == &draft.payment_session_id)
        {
            return Ok(existing.clone());
        }

        self.creates.fetch_add(1, Ordering::SeqCst);
        let doc = OrderCreatedDoc {
            order_id: OrderId::new(format!("ord_{}", by_session.len() + 1)),
            created_at: Utc::now(),
        };
        by_session.push((draft.payment_session_id.clone(), doc.clone()));
        Ok(doc)
    }
}

#[async_trait]
impl OrderApi for FakeOrderService {
    async fn create_guest(&self, draft: &OrderDraftDoc) -> Result<OrderCreatedDoc, ApiError> {
        self.create(draft)
    }

    async fn create_for_customer(
        &self,
        _customer_id: &CustomerId,
        draft: &OrderDraftDoc,
    ) -> Result<OrderCreatedDoc, ApiError> {
        self.create(draft)
    }
}

// =============================================================================
// Payment gateway fake
// =============================================================================

/// Gateway holding scripted checkout sessions.
#[derive(Default)]
pub struct FakePaymentGateway {
    sessions: Mutex<HashMap<String, PaymentSessionDoc>>,
}

impl FakePaymentGateway {
    /// Register a completed session with the given buyer email.
    pub fn insert_complete(&self, session_id: &str, email: Option<&str>) {
        let mut sessions = self.sessions.lock().expect("gateway fake lock");
        sessions.insert(
            session_id.to_owned(),
            PaymentSessionDoc {
                buyer_email: email.map(str::to_owned),
                buyer_name: Some("Alex Buyer".to_string()),
                shipping_address: vec!["1 Shore Rd".to_string(), "Port Haven".to_string()],
                status: "complete".to_string(),
            },
        );
    }

    /// Register an expired session.
    pub fn insert_expired(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().expect("gateway fake lock");
        sessions.insert(
            session_id.to_owned(),
            PaymentSessionDoc {
                buyer_email: None,
                buyer_name: None,
                shipping_address: vec![],
                status: "expired".to_string(),
            },
        );
    }
}

#[async_trait]
impl PaymentSessionApi for FakePaymentGateway {
    async fn fetch_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<PaymentSessionDoc, ApiError> {
        let sessions = self.sessions.lock().expect("gateway fake lock");
        sessions
            .get(session_id.as_str())
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("unknown session {session_id}")))
    }
}

// =============================================================================
// Notification fake
// =============================================================================

/// Notification service recording every queued email.
#[derive(Default)]
pub struct FakeNotifier {
    /// Emails queued so far.
    pub sent: Mutex<Vec<ConfirmationEmailDoc>>,
    /// Fail the next send with a 500.
    pub fail_next: AtomicBool,
}

#[async_trait]
impl NotificationApi for FakeNotifier {
    async fn send_confirmation(&self, doc: &ConfirmationEmailDoc) -> Result<(), ApiError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ApiError::Api {
                status: 500,
                message: "mail relay down".to_string(),
            });
        }
        self.sent.lock().expect("notifier fake lock").push(doc.clone());
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A fully wired engine over fakes, with handles into each of them.
pub struct TestHarness {
    /// The engine under test.
    pub checkout: CheckoutState,
    /// Cart service handle.
    pub carts: Arc<FakeCartService>,
    /// Order service handle.
    pub orders: Arc<FakeOrderService>,
    /// Payment gateway handle.
    pub gateway: Arc<FakePaymentGateway>,
    /// Notification service handle.
    pub notifier: Arc<FakeNotifier>,
    /// The persisted state store backing the engine.
    pub store: StateStore,
}

impl TestHarness {
    /// Wire a fresh engine over fresh fakes.
    #[must_use]
    pub fn new() -> Self {
        let carts = Arc::new(FakeCartService::default());
        let orders = Arc::new(FakeOrderService::default());
        let gateway = Arc::new(FakePaymentGateway::default());
        let notifier = Arc::new(FakeNotifier::default());
        let store = StateStore::in_memory();

        let clients = ServiceClients {
            carts: Arc::clone(&carts) as Arc<dyn CartApi>,
            catalog: Arc::new(FakeCatalog),
            orders: Arc::clone(&orders) as Arc<dyn OrderApi>,
            payments: Arc::clone(&gateway) as Arc<dyn PaymentSessionApi>,
            notifications: Arc::clone(&notifier) as Arc<dyn NotificationApi>,
        };
        let checkout = CheckoutState::with_clients(clients, store.clone());

        Self {
            checkout,
            carts,
            orders,
            gateway,
            notifier,
            store,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// An authenticated identity for tests.
#[must_use]
pub fn identity(customer: &str) -> Identity {
    Identity {
        customer_id: CustomerId::new(customer),
        email: Email::parse(&format!("{customer}@example.com")).expect("test email"),
    }
}

/// A cart item for tests.
#[must_use]
pub fn item(product: &str, unit_price: rust_decimal::Decimal, quantity: u32) -> CartItem {
    CartItem {
        product_id: ProductId::new(product),
        name: format!("Product {product}"),
        image: format!("https://cdn.seagrape.test/{product}.jpg"),
        unit_price: Money::new(unit_price).expect("test price"),
        quantity,
    }
}
