use thiserror::Error;

/// Validation failures raised by the checkout state machine.
///
/// Every variant is recoverable: the shopper retries with corrected input.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("User not found: `{identifier}`")]
    UserNotFound { identifier: String },
    #[error("Checkout session `{session_id}` not found")]
    SessionNotFound { session_id: String },
    #[error("Payment method `{method_id}` not found in the wallet of `{user_id}`")]
    PaymentMethodNotFound { user_id: String, method_id: String },
    #[error("Address `{address_id}` not found for `{user_id}`")]
    AddressNotFound { user_id: String, address_id: String },
    #[error("Checkout is incomplete: select a {} first", .missing.join(" and a "))]
    IncompleteCheckout { missing: Vec<&'static str> },
    #[error("Checkout session `{session_id}` is already completed")]
    CheckoutClosed { session_id: String },
    #[error("Checkout session `{session_id}` does not belong to `{user_id}`")]
    UserMismatch { session_id: String, user_id: String },
}

impl CheckoutError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound { .. } => "user_not_found",
            Self::SessionNotFound { .. } => "session_not_found",
            Self::PaymentMethodNotFound { .. } => "payment_method_not_found",
            Self::AddressNotFound { .. } => "address_not_found",
            Self::IncompleteCheckout { .. } => "incomplete_checkout",
            Self::CheckoutClosed { .. } => "checkout_closed",
            Self::UserMismatch { .. } => "user_mismatch",
        }
    }
}
