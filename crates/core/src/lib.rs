pub mod checkout;
pub mod config;
pub mod domain;
pub mod errors;
pub mod fixtures;
pub mod protocol;

pub use checkout::{CheckoutStateMachine, InMemoryUserDirectory, UserDirectory};
pub use domain::account::{Address, PaymentMethod, UserAccount, UserId};
pub use domain::capability::Capability;
pub use domain::cart::{cart_total, CartItem, ItemId};
pub use domain::checkout::{
    CheckoutSession, CheckoutSessionId, CheckoutStatus, Transaction, TransactionId,
    TransactionStatus,
};
pub use domain::inventory::{Availability, InventoryItem};
pub use errors::CheckoutError;
pub use protocol::ToolOutcome;
