use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use storefront_core::checkout::{CheckoutStateMachine, InMemoryUserDirectory, UserDirectory};
use storefront_core::domain::capability::{names, Capability};
use storefront_core::domain::cart::CartItem;
use storefront_core::errors::CheckoutError;
use storefront_core::fixtures::seed_users;
use tracing::{debug, info};

use crate::server::CapabilityHandler;
use crate::tools::{capability, parse_args, to_json};
use crate::McpError;

#[derive(Debug, Deserialize, JsonSchema)]
struct VerifyEmail {
    /// The email address to verify
    email: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct Authenticate {
    /// The shopper's user ID or email
    #[serde(alias = "user_id")]
    identifier: String,
    #[serde(default)]
    #[schemars(skip)]
    cart: Vec<CartItem>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct UserLookup {
    /// The ID of the user
    user_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SelectPaymentMethod {
    /// The checkout session returned by authenticate_user
    session_id: String,
    /// ID of a payment method from the user's wallet
    payment_method_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SelectShippingAddress {
    /// The checkout session returned by authenticate_user
    session_id: String,
    /// ID of one of the user's saved addresses
    address_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CompleteCheckout {
    /// The checkout session to complete
    session_id: String,
    #[serde(default)]
    #[schemars(skip)]
    user_id: Option<String>,
    #[serde(default)]
    #[schemars(skip)]
    cart: Option<Vec<CartItem>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SessionLookup {
    /// The checkout session ID
    session_id: String,
}

/// Owns the shopper directory and the checkout state machine for the
/// lifetime of the process.
pub struct PaymentHandler<D = InMemoryUserDirectory> {
    machine: CheckoutStateMachine<D>,
}

impl PaymentHandler<InMemoryUserDirectory> {
    pub fn seeded() -> Self {
        Self::new(InMemoryUserDirectory::new(seed_users()))
    }
}

impl<D> PaymentHandler<D>
where
    D: UserDirectory,
{
    pub fn new(directory: D) -> Self {
        Self { machine: CheckoutStateMachine::new(directory) }
    }

    fn complete(&mut self, input: CompleteCheckout) -> Result<Value, McpError> {
        if let Some(user_id) = &input.user_id {
            let owner = &self.machine.session(&input.session_id)?.user_id;
            if owner.as_str() != user_id {
                return Err(CheckoutError::UserMismatch {
                    session_id: input.session_id,
                    user_id: user_id.clone(),
                }
                .into());
            }
        }
        if let Some(cart) = &input.cart {
            debug!(
                event_name = "payment.complete.cart_received",
                session_id = %input.session_id,
                lines = cart.len(),
                "ignoring caller cart; the session snapshot is authoritative"
            );
        }

        let transaction = self.machine.complete(&input.session_id)?;
        info!(
            event_name = "payment.checkout_completed",
            session_id = %input.session_id,
            transaction_id = %transaction.id.0,
            amount = %transaction.amount,
            "transaction recorded"
        );
        to_json(&transaction)
    }
}

impl<D> CapabilityHandler for PaymentHandler<D>
where
    D: UserDirectory,
{
    fn server_name(&self) -> &'static str {
        "payment"
    }

    fn instructions(&self) -> Option<&'static str> {
        Some(
            "Authenticate the shopper, then select a payment method and a shipping address \
             before completing checkout.",
        )
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            capability::<VerifyEmail>("verify_email", "Check whether a user email is registered."),
            capability::<Authenticate>(
                names::AUTHENTICATE_USER,
                "Authenticate a shopper by user ID or email and open a checkout session.",
            ),
            capability::<UserLookup>("get_user_wallet", "Get the user's saved payment methods."),
            capability::<UserLookup>("get_user_addresses", "Get the user's saved addresses."),
            capability::<SelectPaymentMethod>(
                names::SELECT_PAYMENT_METHOD,
                "Select the payment method for a checkout session.",
            ),
            capability::<SelectShippingAddress>(
                names::SELECT_SHIPPING_ADDRESS,
                "Select the shipping address for a checkout session.",
            ),
            capability::<CompleteCheckout>(
                names::COMPLETE_CHECKOUT,
                "Process the final payment. Only call after the user confirms the summary.",
            ),
            capability::<SessionLookup>(names::CANCEL_CHECKOUT, "Cancel a checkout session."),
            capability::<SessionLookup>(
                names::GET_CHECKOUT_SESSION,
                "Get the current state of a checkout session.",
            ),
        ]
    }

    fn invoke(&mut self, name: &str, arguments: Map<String, Value>) -> Result<Value, McpError> {
        match name {
            "verify_email" => {
                let input: VerifyEmail = parse_args(name, arguments)?;
                let known = self.machine.directory().find(&input.email).is_some_and(|user| {
                    user.email.eq_ignore_ascii_case(input.email.trim())
                });
                Ok(Value::Bool(known))
            }
            names::AUTHENTICATE_USER => {
                let input: Authenticate = parse_args(name, arguments)?;
                let session = self.machine.authenticate(&input.identifier, input.cart)?;
                info!(
                    event_name = "payment.authenticated",
                    session_id = %session.session_id.0,
                    user_id = %session.user_id.0,
                    total = %session.total_amount,
                    "checkout session opened"
                );
                to_json(&session)
            }
            "get_user_wallet" => {
                let input: UserLookup = parse_args(name, arguments)?;
                to_json(&self.machine.find_user(&input.user_id)?.wallet)
            }
            "get_user_addresses" => {
                let input: UserLookup = parse_args(name, arguments)?;
                to_json(&self.machine.find_user(&input.user_id)?.addresses)
            }
            names::SELECT_PAYMENT_METHOD => {
                let input: SelectPaymentMethod = parse_args(name, arguments)?;
                to_json(
                    &self.machine.select_payment_method(&input.session_id, &input.payment_method_id)?,
                )
            }
            names::SELECT_SHIPPING_ADDRESS => {
                let input: SelectShippingAddress = parse_args(name, arguments)?;
                to_json(&self.machine.select_shipping_address(&input.session_id, &input.address_id)?)
            }
            names::COMPLETE_CHECKOUT => {
                let input: CompleteCheckout = parse_args(name, arguments)?;
                self.complete(input)
            }
            names::CANCEL_CHECKOUT => {
                let input: SessionLookup = parse_args(name, arguments)?;
                let cancelled = self.machine.cancel(&input.session_id)?;
                Ok(serde_json::json!({
                    "message": "Checkout cancelled",
                    "session_id": cancelled.session_id,
                }))
            }
            names::GET_CHECKOUT_SESSION => {
                let input: SessionLookup = parse_args(name, arguments)?;
                to_json(self.machine.session(&input.session_id)?)
            }
            other => Err(McpError::UnknownCapability(other.to_string())),
        }
    }
}
