//! The surface a UI talks to: send a message, read the cart, read the
//! checkout status.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use storefront_core::config::AppConfig;
use storefront_core::domain::cart::CartItem;
use storefront_core::domain::checkout::{CheckoutSession, CheckoutStatus};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::llm::{build_client, LlmClient, LlmError};
use crate::manager::{Launcher, ProcessLauncher, SessionManager, SessionStatus};
use crate::orchestrator::{Conversation, ConversationMode, ConversationSnapshot, Orchestrator};
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub item_count: u32,
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckoutView {
    pub mode: ConversationMode,
    pub status: Option<CheckoutStatus>,
    pub session: Option<CheckoutSession>,
    pub missing_selections: Vec<&'static str>,
}

impl From<&ConversationSnapshot> for CartView {
    fn from(snapshot: &ConversationSnapshot) -> Self {
        let cart = &snapshot.cart;
        Self { items: cart.items().to_vec(), item_count: cart.item_count(), total: cart.total() }
    }
}

impl From<&ConversationSnapshot> for CheckoutView {
    fn from(snapshot: &ConversationSnapshot) -> Self {
        let session = snapshot.checkout.clone();
        Self {
            mode: snapshot.mode,
            status: session.as_ref().map(|session| session.status),
            missing_selections: session
                .as_ref()
                .map(CheckoutSession::missing_selections)
                .unwrap_or_default(),
            session,
        }
    }
}

/// Owns one conversation and the backends serving it. Messages are
/// processed strictly one at a time; the cart and checkout views read the
/// latest published snapshot and never wait for a message in flight.
pub struct ShoppingAssistant<L = ProcessLauncher> {
    manager: Arc<SessionManager<L>>,
    orchestrator: Orchestrator<Arc<SessionManager<L>>>,
    conversation: Mutex<Conversation>,
    snapshot: watch::Receiver<ConversationSnapshot>,
}

impl ShoppingAssistant<ProcessLauncher> {
    /// Launches the configured backends and builds the model client.
    pub async fn start(config: &AppConfig) -> Result<Self, AssistantError> {
        let llm = build_client(&config.llm)?;
        let manager = Arc::new(SessionManager::with_processes());
        manager.start_all(config.backends.launch_order()).await?;
        info!(
            event_name = "assistant.started",
            capability_count = manager.registry().await.len(),
            "shopping assistant ready"
        );
        Ok(Self::from_parts(manager, llm, config.orchestrator.max_rounds))
    }
}

impl<L> ShoppingAssistant<L>
where
    L: Launcher,
{
    pub fn from_parts(
        manager: Arc<SessionManager<L>>,
        llm: Arc<dyn LlmClient>,
        max_rounds: u32,
    ) -> Self {
        let (snapshots, snapshot) = watch::channel(ConversationSnapshot::default());
        Self {
            orchestrator: Orchestrator::new(manager.clone(), llm, max_rounds)
                .with_snapshots(snapshots),
            manager,
            conversation: Mutex::new(Conversation::new()),
            snapshot,
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager<L>> {
        &self.manager
    }

    pub async fn send_message(&self, text: &str) -> String {
        let mut conversation = self.conversation.lock().await;
        self.orchestrator.handle_message(&mut conversation, text).await
    }

    pub async fn cart(&self) -> CartView {
        CartView::from(&*self.snapshot.borrow())
    }

    pub async fn checkout_status(&self) -> CheckoutView {
        CheckoutView::from(&*self.snapshot.borrow())
    }

    pub async fn begin_checkout(&self) -> CheckoutView {
        let mut conversation = self.conversation.lock().await;
        conversation.begin_checkout();
        self.orchestrator.publish(&conversation);
        CheckoutView::from(&ConversationSnapshot::of(&conversation))
    }

    pub async fn session_states(&self) -> Vec<SessionStatus> {
        self.manager.session_states().await
    }

    pub async fn shutdown(&self) {
        self.manager.stop_all().await;
    }
}
