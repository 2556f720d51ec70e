//! End-to-end checkout scenarios over the in-process fakes.

use std::sync::atomic::Ordering;

use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use seagrape_checkout::kv::keys;
use seagrape_checkout::{CheckoutError, EmailOutcome, SessionKind};
use seagrape_core::PaymentSessionId;
use seagrape_integration_tests::{TestHarness, identity, item};

fn sess(id: &str) -> PaymentSessionId {
    PaymentSessionId::new(id)
}

// =============================================================================
// Guest checkout
// =============================================================================

/// A guest with cart `[{p1, qty 2, 10.00}]` completes payment under
/// `sess_1`. The first confirmation creates an order totalling 20.00, clears
/// the guest cart, and sets the dedupe marker; a page-refresh second call
/// replays the same order without a second create.
#[tokio::test]
async fn test_guest_checkout_confirms_exactly_once() {
    let harness = TestHarness::new();
    let reconciler = harness.checkout.reconciler();
    let engine = harness.checkout.engine();

    let cart = reconciler
        .add_item(None, item("p1", dec!(10.00), 2))
        .await
        .expect("guest add");
    engine.begin_checkout(None, &cart).expect("begin checkout");

    harness
        .gateway
        .insert_complete("sess_1", Some("buyer@example.com"));

    let first = engine.confirm(None, &sess("sess_1")).await.expect("confirm");
    assert!(first.newly_created);
    assert_eq!(first.order.total.amount(), dec!(20.00));
    assert_eq!(first.order.line_items.len(), 1);
    assert_eq!(first.email, EmailOutcome::Sent);

    // Guest cart cleared, marker set, snapshot consumed
    let token = CancellationToken::new();
    let cart_after = reconciler.current_cart(None, &token).await.expect("read");
    assert!(cart_after.is_empty());
    assert!(
        harness
            .store
            .flag(&keys::dedupe_marker(SessionKind::Guest, &sess("sess_1")))
    );
    assert!(engine.pending_snapshot(None).is_none());

    // Page refresh: same order back, no second create, no second email
    let second = engine.confirm(None, &sess("sess_1")).await.expect("replay");
    assert!(!second.newly_created);
    assert_eq!(second.order.order_id, first.order.order_id);
    assert_eq!(second.order.total, first.order.total);
    assert_eq!(harness.orders.creates.load(Ordering::SeqCst), 1);
    assert_eq!(harness.notifier.sent.lock().expect("lock").len(), 1);
}

#[tokio::test]
async fn test_expired_session_leaves_retry_possible() {
    let harness = TestHarness::new();
    let engine = harness.checkout.engine();

    let cart = harness
        .checkout
        .reconciler()
        .add_item(None, item("p1", dec!(10.00), 1))
        .await
        .expect("guest add");
    engine.begin_checkout(None, &cart).expect("begin checkout");

    harness.gateway.insert_expired("sess_dead");

    let result = engine.confirm(None, &sess("sess_dead")).await;
    assert!(matches!(result, Err(CheckoutError::SessionNotFound(_))));

    // Nothing consumed: snapshot intact, no marker, no order
    assert!(engine.pending_snapshot(None).is_some());
    assert!(
        !harness
            .store
            .flag(&keys::dedupe_marker(SessionKind::Guest, &sess("sess_dead")))
    );
    assert_eq!(harness.orders.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_email_failure_is_soft_and_order_stands() {
    let harness = TestHarness::new();
    let engine = harness.checkout.engine();

    let cart = harness
        .checkout
        .reconciler()
        .add_item(None, item("p1", dec!(7.50), 2))
        .await
        .expect("guest add");
    engine.begin_checkout(None, &cart).expect("begin checkout");

    harness
        .gateway
        .insert_complete("sess_2", Some("buyer@example.com"));
    harness.notifier.fail_next.store(true, Ordering::SeqCst);

    let outcome = engine.confirm(None, &sess("sess_2")).await.expect("confirm");
    assert!(outcome.newly_created);
    assert_eq!(outcome.email, EmailOutcome::Failed);
    assert_eq!(harness.orders.creates.load(Ordering::SeqCst), 1);

    // The failed email did not poison the replay path
    let replay = engine.confirm(None, &sess("sess_2")).await.expect("replay");
    assert_eq!(replay.order.order_id, outcome.order.order_id);
    assert_eq!(harness.orders.creates.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Authenticated checkout
// =============================================================================

/// The full journey: guest browsing, sign-in with merge, more edits, then a
/// confirmed account checkout.
#[tokio::test]
async fn test_signin_merge_then_account_checkout() {
    let harness = TestHarness::new();
    let reconciler = harness.checkout.reconciler();
    let engine = harness.checkout.engine();
    let alex = identity("alex");
    let token = CancellationToken::new();

    // Guest adds p1; the server cart already holds p1 and p2
    reconciler
        .add_item(None, item("p1", dec!(10.00), 2))
        .await
        .expect("guest add");
    harness
        .carts
        .seed_line("alex", "p1", 1, seagrape_core::Money::new(dec!(10.00)).expect("price"));
    harness
        .carts
        .seed_line("alex", "p2", 3, seagrape_core::Money::new(dec!(15.00)).expect("price"));

    // Sign-in merges by summing and persists the identity reference
    harness.checkout.sign_in(alex.clone()).await.expect("sign in");
    assert_eq!(harness.carts.quantity_of("alex", "p1"), Some(3));
    assert_eq!(harness.carts.quantity_of("alex", "p2"), Some(3));
    assert_eq!(harness.checkout.identity(), Some(alex.clone()));

    let cart = reconciler
        .current_cart(Some(&alex), &token)
        .await
        .expect("server cart");
    assert_eq!(cart.total_quantity(), 6);

    // Checkout the merged cart
    engine
        .begin_checkout(Some(&alex), &cart)
        .expect("begin checkout");
    harness
        .gateway
        .insert_complete("sess_acct", Some("alex@example.com"));

    let outcome = engine
        .confirm(Some(&alex), &sess("sess_acct"))
        .await
        .expect("confirm");
    assert!(outcome.newly_created);
    assert_eq!(outcome.order.total, cart.subtotal());
    assert!(
        harness
            .store
            .flag(&keys::dedupe_marker(SessionKind::Account, &sess("sess_acct")))
    );

    let sent = harness.notifier.sent.lock().expect("lock");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent.first().expect("one email").to, "alex@example.com");
}

#[tokio::test]
async fn test_create_failure_then_retry_creates_single_order() {
    let harness = TestHarness::new();
    let engine = harness.checkout.engine();

    let cart = harness
        .checkout
        .reconciler()
        .add_item(None, item("p1", dec!(12.00), 1))
        .await
        .expect("guest add");
    engine.begin_checkout(None, &cart).expect("begin checkout");
    harness.gateway.insert_complete("sess_3", None);

    harness.orders.fail_next.store(true, Ordering::SeqCst);
    let first = engine.confirm(None, &sess("sess_3")).await;
    assert!(matches!(first, Err(CheckoutError::Transient(_))));
    assert!(engine.pending_snapshot(None).is_some());

    let retry = engine.confirm(None, &sess("sess_3")).await.expect("retry");
    assert!(retry.newly_created);
    // No buyer email on the session: the mail is skipped, not failed
    assert_eq!(retry.email, EmailOutcome::Skipped);
    assert_eq!(harness.orders.creates.load(Ordering::SeqCst), 1);
}
