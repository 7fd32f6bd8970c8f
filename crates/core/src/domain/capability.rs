use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, schema-described operation advertised by a backend.
///
/// Capabilities are immutable once discovered. The registry keys them by
/// `name`, so the name must be unique across every connected backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl Capability {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self { name: name.into(), description: description.into(), input_schema }
    }
}

/// Capability names the orchestrator treats specially.
pub mod names {
    pub const SEARCH_ITEMS: &str = "search_items";
    pub const ADD_TO_CART: &str = "add_to_cart";
    pub const GET_CART: &str = "get_cart";
    pub const REMOVE_FROM_CART: &str = "remove_from_cart";
    pub const CLEAR_CART: &str = "clear_cart";
    pub const AUTHENTICATE_USER: &str = "authenticate_user";
    pub const SELECT_PAYMENT_METHOD: &str = "select_payment_method";
    pub const SELECT_SHIPPING_ADDRESS: &str = "select_shipping_address";
    pub const COMPLETE_CHECKOUT: &str = "complete_checkout";
    pub const CANCEL_CHECKOUT: &str = "cancel_checkout";
    pub const GET_CHECKOUT_SESSION: &str = "get_checkout_session";
}
