use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use storefront_core::domain::cart::{cart_total, CartItem};
use storefront_core::protocol::ToolOutcome;

/// Process-local view of what the user intends to buy.
///
/// Items are snapshots taken when they were added; prices are never
/// re-validated against the catalog afterwards.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CartCache {
    items: Vec<CartItem>,
}

impl CartCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn total(&self) -> Decimal {
        cart_total(&self.items)
    }

    /// Sum of quantities, not of distinct lines.
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn replace(&mut self, items: Vec<CartItem>) {
        self.items = items;
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Replaces the cache from a cart-bearing result: either a bare list of
    /// items or an object with a `cart` field. Returns whether it applied.
    pub fn sync_from(&mut self, outcome: &ToolOutcome) -> bool {
        let cart = match outcome {
            ToolOutcome::List(items) => Value::Array(items.clone()),
            ToolOutcome::Value(_) => match outcome.field("cart") {
                Some(cart) => cart.clone(),
                None => return false,
            },
            ToolOutcome::Error(_) => return false,
        };

        match serde_json::from_value::<Vec<CartItem>>(cart) {
            Ok(items) => {
                self.items = items;
                true
            }
            Err(_) => false,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.items).unwrap_or(Value::Array(Vec::new()))
    }
}
