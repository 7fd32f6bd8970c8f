use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::account::{Address, PaymentMethod, UserId};
use crate::domain::cart::CartItem;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckoutSessionId(pub String);

impl CheckoutSessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

pub const MISSING_PAYMENT_METHOD: &str = "payment method";
pub const MISSING_SHIPPING_ADDRESS: &str = "shipping address";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Pending,
    PaymentMethodSelected,
    AddressSelected,
    Ready,
    Completed,
}

impl CheckoutStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PaymentMethodSelected => "payment_method_selected",
            Self::AddressSelected => "address_selected",
            Self::Ready => "ready",
            Self::Completed => "completed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: CheckoutSessionId,
    pub user_id: UserId,
    pub cart: Vec<CartItem>,
    pub total_amount: Decimal,
    #[serde(default)]
    pub selected_payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub selected_address: Option<Address>,
    pub status: CheckoutStatus,
    pub created_at: DateTime<Utc>,
}

impl CheckoutSession {
    /// Selections still required before the session may complete, in the
    /// order a shopper is asked for them.
    pub fn missing_selections(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.selected_payment_method.is_none() {
            missing.push(MISSING_PAYMENT_METHOD);
        }
        if self.selected_address.is_none() {
            missing.push(MISSING_SHIPPING_ADDRESS);
        }
        missing
    }

    /// Status implied by the current selections. Never called on a completed
    /// session.
    pub(crate) fn selection_status(&self) -> CheckoutStatus {
        match (self.selected_payment_method.is_some(), self.selected_address.is_some()) {
            (true, true) => CheckoutStatus::Ready,
            (true, false) => CheckoutStatus::PaymentMethodSelected,
            (false, true) => CheckoutStatus::AddressSelected,
            (false, false) => CheckoutStatus::Pending,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub session_id: CheckoutSessionId,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub payment_method_id: String,
    pub shipping_address_id: String,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
}
