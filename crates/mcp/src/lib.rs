//! Storefront backend capability servers.
//!
//! Each backend is a [`CapabilityHandler`] served over MCP on stdin/stdout
//! by [`serve_stdio`]:
//!
//! - `catalog`: inventory browsing and the shopping cart
//! - `payment`: shopper lookup and the checkout state machine
//!
//! ## Example Usage
//!
//! ```no_run
//! use storefront_mcp::{serve_stdio, CatalogHandler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     serve_stdio(CatalogHandler::seeded()).await?;
//!     Ok(())
//! }
//! ```

mod catalog;
mod payment;
mod server;
mod tools;

pub use catalog::{CartRepository, CatalogHandler, InventoryRepository};
pub use payment::PaymentHandler;
pub use server::{
    call_capability, forward_frames, init_backend_logging, serve, serve_stdio, server_info,
    CapabilityHandler, CapabilityServer,
};

use storefront_core::errors::CheckoutError;
use thiserror::Error;

/// Errors raised while serving a capability. The display text is what the
/// caller sees as the text of an `is_error` tool result.
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown capability `{0}`")]
    UnknownCapability(String),

    #[error("Invalid arguments for `{capability}`: {message}")]
    InvalidArguments { capability: String, message: String },

    #[error("Item {0} not found")]
    ItemNotFound(String),

    #[error("Item {0} is not in the cart")]
    NotInCart(String),

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Not enough stock. Available: {available}")]
    InsufficientStock { available: u32 },

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}
