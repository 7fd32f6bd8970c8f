//! Checkout state machine.
//!
//! A checkout session is created by a successful authentication and then
//! collects a payment method and a shipping address, in either order:
//!
//! ```text
//! pending ─┬─ payment method ─> payment_method_selected ─ address ─┐
//!          └─ address ────────> address_selected ── payment method ┴─> ready ─> completed
//! ```
//!
//! `complete` is only legal from `ready`, so a transaction can never be
//! produced without both selections. `completed` is terminal.

mod directory;

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

pub use directory::{InMemoryUserDirectory, UserDirectory};

use crate::domain::account::UserAccount;
use crate::domain::cart::{cart_total, CartItem};
use crate::domain::checkout::{
    CheckoutSession, CheckoutSessionId, CheckoutStatus, Transaction, TransactionId,
    TransactionStatus,
};
use crate::errors::CheckoutError;

pub struct CheckoutStateMachine<D> {
    directory: D,
    sessions: HashMap<String, CheckoutSession>,
}

impl<D> CheckoutStateMachine<D>
where
    D: UserDirectory,
{
    pub fn new(directory: D) -> Self {
        Self { directory, sessions: HashMap::new() }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn find_user(&self, identifier: &str) -> Result<UserAccount, CheckoutError> {
        self.directory
            .find(identifier)
            .ok_or_else(|| CheckoutError::UserNotFound { identifier: identifier.to_string() })
    }

    /// Opens a new session for the shopper behind `identifier`, snapshotting
    /// `cart` and its total. Any other live session is discarded so that at
    /// most one is in flight, and the shopper's earlier completed session is
    /// dropped. Each shopper keeps at most their latest completed session.
    pub fn authenticate(
        &mut self,
        identifier: &str,
        cart: Vec<CartItem>,
    ) -> Result<CheckoutSession, CheckoutError> {
        let account = self.find_user(identifier)?;

        self.sessions.retain(|_, session| {
            session.status.is_terminal() && session.user_id != account.user_id
        });

        let session = CheckoutSession {
            session_id: CheckoutSessionId(format!("cs_{}", Uuid::new_v4().simple())),
            user_id: account.user_id,
            total_amount: cart_total(&cart),
            cart,
            selected_payment_method: None,
            selected_address: None,
            status: CheckoutStatus::Pending,
            created_at: Utc::now(),
        };
        self.sessions.insert(session.session_id.0.clone(), session.clone());
        Ok(session)
    }

    pub fn select_payment_method(
        &mut self,
        session_id: &str,
        method_id: &str,
    ) -> Result<CheckoutSession, CheckoutError> {
        let account = self.open_session_owner(session_id)?;
        let method = account.payment_method(method_id).cloned().ok_or_else(|| {
            CheckoutError::PaymentMethodNotFound {
                user_id: account.user_id.0.clone(),
                method_id: method_id.to_string(),
            }
        })?;

        let session = self.open_session_mut(session_id)?;
        session.selected_payment_method = Some(method);
        session.status = session.selection_status();
        Ok(session.clone())
    }

    pub fn select_shipping_address(
        &mut self,
        session_id: &str,
        address_id: &str,
    ) -> Result<CheckoutSession, CheckoutError> {
        let account = self.open_session_owner(session_id)?;
        let address = account.address(address_id).cloned().ok_or_else(|| {
            CheckoutError::AddressNotFound {
                user_id: account.user_id.0.clone(),
                address_id: address_id.to_string(),
            }
        })?;

        let session = self.open_session_mut(session_id)?;
        session.selected_address = Some(address);
        session.status = session.selection_status();
        Ok(session.clone())
    }

    pub fn complete(&mut self, session_id: &str) -> Result<Transaction, CheckoutError> {
        let session = self.open_session_mut(session_id)?;

        let (Some(method), Some(address), CheckoutStatus::Ready) =
            (&session.selected_payment_method, &session.selected_address, session.status)
        else {
            return Err(CheckoutError::IncompleteCheckout { missing: session.missing_selections() });
        };

        let now = Utc::now();
        let transaction = Transaction {
            id: TransactionId(format!(
                "tx_{}_{}",
                now.format("%Y%m%d%H%M%S"),
                &Uuid::new_v4().simple().to_string()[..8]
            )),
            session_id: session.session_id.clone(),
            status: TransactionStatus::Completed,
            amount: session.total_amount,
            payment_method_id: method.id.clone(),
            shipping_address_id: address.id.clone(),
            items: session.cart.clone(),
            created_at: now,
        };
        session.status = CheckoutStatus::Completed;
        Ok(transaction)
    }

    /// Destroys a live session. Completed sessions are closed and stay as they are.
    pub fn cancel(&mut self, session_id: &str) -> Result<CheckoutSession, CheckoutError> {
        self.open_session_mut(session_id)?;
        self.sessions
            .remove(session_id)
            .ok_or_else(|| CheckoutError::SessionNotFound { session_id: session_id.to_string() })
    }

    pub fn session(&self, session_id: &str) -> Result<&CheckoutSession, CheckoutError> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| CheckoutError::SessionNotFound { session_id: session_id.to_string() })
    }

    pub fn live_session(&self) -> Option<&CheckoutSession> {
        self.sessions.values().find(|session| !session.status.is_terminal())
    }

    fn open_session_mut(&mut self, session_id: &str) -> Result<&mut CheckoutSession, CheckoutError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| CheckoutError::SessionNotFound { session_id: session_id.to_string() })?;
        if session.status.is_terminal() {
            return Err(CheckoutError::CheckoutClosed { session_id: session_id.to_string() });
        }
        Ok(session)
    }

    fn open_session_owner(&mut self, session_id: &str) -> Result<UserAccount, CheckoutError> {
        let user_id = self.open_session_mut(session_id)?.user_id.0.clone();
        self.find_user(&user_id)
    }
}
