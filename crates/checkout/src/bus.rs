//! In-process event channel.
//!
//! Display components refresh off these signals instead of polling. The bus
//! is a thin wrapper over a `tokio` broadcast channel: publishing never
//! blocks, subscribers that lag are allowed to miss events (they re-read
//! authoritative state anyway), and dropping a receiver unsubscribes it.

use tokio::sync::broadcast;

/// Events published by the checkout engine.
///
/// Payload-free by contract: an event means "something changed, re-read
/// authoritative state", nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutEvent {
    /// Cart contents changed (mutation, migration, or order placement).
    CartUpdated,
    /// An order was confirmed.
    OrderUpdated,
}

/// Broadcast channel for [`CheckoutEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CheckoutEvent>,
}

impl EventBus {
    /// Default channel capacity.
    const DEFAULT_CAPACITY: usize = 64;

    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Create a bus with an explicit channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// A bus with no subscribers drops the event silently; that is the
    /// normal state before any display component has attached.
    pub fn publish(&self, event: CheckoutEvent) {
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(?event, receivers, "published event");
            }
            Err(_) => {
                tracing::trace!(?event, "no subscribers for event");
            }
        }
    }

    /// Subscribe to events published after this call.
    ///
    /// Drop the returned receiver to unsubscribe.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CheckoutEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(CheckoutEvent::CartUpdated);
        bus.publish(CheckoutEvent::OrderUpdated);

        assert_eq!(rx.recv().await.unwrap(), CheckoutEvent::CartUpdated);
        assert_eq!(rx.recv().await.unwrap(), CheckoutEvent::OrderUpdated);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        // Must not panic or error
        bus.publish(CheckoutEvent::CartUpdated);
    }

    #[tokio::test]
    async fn test_dropped_receiver_unsubscribes() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);

        bus.publish(CheckoutEvent::CartUpdated);

        // A fresh subscriber only sees events published after it attached
        let mut rx = bus.subscribe();
        bus.publish(CheckoutEvent::OrderUpdated);
        assert_eq!(rx.recv().await.unwrap(), CheckoutEvent::OrderUpdated);
    }
}
