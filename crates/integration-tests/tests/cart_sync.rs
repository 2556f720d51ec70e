//! Cart synchronization properties: serialization, cancellation, and
//! degraded reads.

use std::sync::atomic::Ordering;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use seagrape_checkout::{CheckoutError, CheckoutEvent};
use seagrape_integration_tests::{TestHarness, identity, item};

/// Two rapid adds of the same product must both land: final server quantity
/// is 2, never 1 from a lost update.
#[tokio::test]
async fn test_rapid_double_add_loses_no_update() {
    let harness = TestHarness::new();
    let reconciler = harness.checkout.reconciler();
    let alex = identity("alex");

    let (first, second) = tokio::join!(
        reconciler.add_item(Some(&alex), item("p1", dec!(10.00), 1)),
        reconciler.add_item(Some(&alex), item("p1", dec!(10.00), 1)),
    );
    first.expect("first add");
    second.expect("second add");

    assert_eq!(harness.carts.quantity_of("alex", "p1"), Some(2));
}

/// Aborting a cart fetch before it resolves surfaces as `Cancelled` - not a
/// user-visible error - and mutates nothing.
#[tokio::test]
async fn test_cancelled_fetch_mutates_nothing() {
    let harness = TestHarness::new();
    let reconciler = harness.checkout.reconciler().clone();
    let alex = identity("alex");

    harness.carts.seed_line(
        "alex",
        "p1",
        1,
        seagrape_core::Money::new(dec!(10.00)).expect("price"),
    );
    harness.carts.fetch_delay_ms.store(200, Ordering::SeqCst);

    let mut events = harness.checkout.bus().subscribe();

    let token = CancellationToken::new();
    let fetch_token = token.clone();
    let alex_for_fetch = alex.clone();
    let fetch = tokio::spawn(async move {
        reconciler
            .current_cart(Some(&alex_for_fetch), &fetch_token)
            .await
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    let result = fetch.await.expect("join");
    assert!(matches!(result, Err(CheckoutError::Cancelled)));

    // No signal was published for the abandoned read
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    // A fresh read still sees the authoritative server state
    harness.carts.fetch_delay_ms.store(0, Ordering::SeqCst);
    let cart = harness
        .checkout
        .reconciler()
        .current_cart(Some(&alex), &CancellationToken::new())
        .await
        .expect("fresh read");
    assert_eq!(cart.total_quantity(), 1);
}

/// A customer with no cart record yet reads as an empty cart, not an error.
#[tokio::test]
async fn test_missing_server_cart_reads_empty() {
    let harness = TestHarness::new();
    let alex = identity("alex");

    let cart = harness
        .checkout
        .reconciler()
        .current_cart(Some(&alex), &CancellationToken::new())
        .await
        .expect("read");

    assert!(cart.is_empty());
}

/// Mutations publish `cart-updated` so display components refresh without
/// polling.
#[tokio::test]
async fn test_mutations_publish_cart_updated() {
    let harness = TestHarness::new();
    let mut events = harness.checkout.bus().subscribe();

    harness
        .checkout
        .reconciler()
        .add_item(None, item("p1", dec!(4.00), 1))
        .await
        .expect("guest add");

    assert_eq!(
        events.recv().await.expect("event"),
        CheckoutEvent::CartUpdated
    );
}

/// Sign-out drops the authenticated display state; the guest cart starts
/// empty rather than leaking the account's contents.
#[tokio::test]
async fn test_sign_out_returns_to_empty_guest_cart() {
    let harness = TestHarness::new();
    let alex = identity("alex");

    harness.checkout.sign_in(alex.clone()).await.expect("sign in");
    harness
        .checkout
        .reconciler()
        .add_item(Some(&alex), item("p1", dec!(10.00), 1))
        .await
        .expect("add");

    harness.checkout.sign_out().await;
    assert!(harness.checkout.identity().is_none());

    let guest = harness
        .checkout
        .reconciler()
        .current_cart(None, &CancellationToken::new())
        .await
        .expect("guest read");
    assert!(guest.is_empty());

    // The server cart is untouched by sign-out
    assert_eq!(harness.carts.quantity_of("alex", "p1"), Some(1));
}
