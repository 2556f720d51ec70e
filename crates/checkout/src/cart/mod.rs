//! Cart domain model and the components that keep it consistent.
//!
//! A [`Cart`] is an ordered collection of [`CartItem`]s, unique by product
//! ID. Two lifecycles exist: the guest cart (persisted locally, owned by the
//! anonymous session) and the server cart (remote source of truth, owned by
//! an authenticated customer). [`CartStore`] is pure data access over both;
//! [`CartReconciler`] presents them as one logical cart and migrates guest
//! contents into the server cart at sign-in.

mod reconciler;
mod store;

pub use reconciler::CartReconciler;
pub use store::CartStore;

use serde::{Deserialize, Serialize};

use seagrape_core::{Money, ProductId};

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Product ID.
    pub product_id: ProductId,
    /// Product display name.
    pub name: String,
    /// Product image URL.
    pub image: String,
    /// Unit price.
    pub unit_price: Money,
    /// Quantity; always at least 1 (a line at 0 is removed, never stored).
    pub quantity: u32,
}

impl CartItem {
    /// Price of the whole line.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// An ordered cart, unique by product ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from items, merging duplicate product IDs by summing
    /// quantities.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            cart.add_item(item);
        }
        cart
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The cart lines, in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Look up a line by product ID.
    #[must_use]
    pub fn get(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    /// Add an item. Re-adding an existing product increments its quantity
    /// rather than duplicating the line; a zero-quantity add is a no-op.
    pub fn add_item(&mut self, item: CartItem) {
        if item.quantity == 0 {
            return;
        }
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|line| line.product_id == item.product_id)
        {
            existing.quantity += item.quantity;
        } else {
            self.items.push(item);
        }
    }

    /// Set the quantity of an existing line. Zero removes the line; an
    /// unknown product ID is a no-op.
    pub fn set_quantity(&mut self, product_id: &ProductId, quantity: u32) {
        if quantity == 0 {
            self.remove(product_id);
            return;
        }
        if let Some(line) = self
            .items
            .iter_mut()
            .find(|line| &line.product_id == product_id)
        {
            line.quantity = quantity;
        }
    }

    /// Remove a line by product ID.
    pub fn remove(&mut self, product_id: &ProductId) {
        self.items.retain(|line| &line.product_id != product_id);
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Total quantity across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|line| line.quantity).sum()
    }
}

/// One mutation against a server cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOp {
    /// Increase the quantity of a product by `quantity`, creating the line
    /// if absent.
    Add {
        /// Product to add.
        product_id: ProductId,
        /// Quantity to add.
        quantity: u32,
        /// Total price of the added quantity.
        line_total: Money,
    },
    /// Set the quantity of a line outright.
    SetQuantity {
        /// Product to update.
        product_id: ProductId,
        /// New quantity.
        quantity: u32,
    },
    /// Remove a line.
    Remove {
        /// Product to remove.
        product_id: ProductId,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(id: &str, price: rust_decimal::Decimal, quantity: u32) -> CartItem {
        CartItem {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            image: format!("https://cdn.example.com/{id}.jpg"),
            unit_price: Money::new(price).unwrap(),
            quantity,
        }
    }

    #[test]
    fn test_add_merges_duplicate_product() {
        let mut cart = Cart::new();
        cart.add_item(item("p1", dec!(10.00), 2));
        cart.add_item(item("p1", dec!(10.00), 3));

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.get(&ProductId::new("p1")).unwrap().quantity, 5);
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let mut cart = Cart::new();
        cart.add_item(item("p2", dec!(5.00), 1));
        cart.add_item(item("p1", dec!(10.00), 1));
        cart.add_item(item("p2", dec!(5.00), 1));

        let ids: Vec<&str> = cart.items().iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, ["p2", "p1"]);
    }

    #[test]
    fn test_zero_quantity_add_is_noop() {
        let mut cart = Cart::new();
        cart.add_item(item("p1", dec!(10.00), 0));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity_zero_removes_line() {
        let mut cart = Cart::new();
        cart.add_item(item("p1", dec!(10.00), 2));
        cart.set_quantity(&ProductId::new("p1"), 0);

        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity_unknown_product_is_noop() {
        let mut cart = Cart::new();
        cart.add_item(item("p1", dec!(10.00), 2));
        cart.set_quantity(&ProductId::new("p9"), 4);

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.get(&ProductId::new("p1")).unwrap().quantity, 2);
    }

    #[test]
    fn test_subtotal_and_total_quantity() {
        let mut cart = Cart::new();
        cart.add_item(item("p1", dec!(10.00), 2));
        cart.add_item(item("p2", dec!(2.50), 4));

        assert_eq!(cart.subtotal().amount(), dec!(30.00));
        assert_eq!(cart.total_quantity(), 6);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut cart = Cart::new();
        cart.add_item(item("p1", dec!(10.00), 2));

        let json = serde_json::to_string(&cart).unwrap();
        let parsed: Cart = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cart);
    }
}
