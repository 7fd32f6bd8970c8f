//! The bounded tool-calling loop.
//!
//! One call to [`Orchestrator::handle_message`] is one orchestration run:
//! the model is asked for a reply, any capability calls it requests are
//! executed one at a time in the order given, their results are folded
//! back in, and the model is asked again. The run ends when the model
//! answers without requesting anything, or after `max_rounds` rounds.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use storefront_core::domain::capability::{names, Capability};
use storefront_core::domain::checkout::{CheckoutSession, CheckoutStatus, Transaction};
use storefront_core::protocol::ToolOutcome;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cart::CartCache;
use crate::llm::{ChatMessage, LlmClient, ToolCall, ToolSpec};
use crate::manager::{Launcher, RouteError, SessionManager};
use crate::prompts::system_prompt;

#[async_trait]
pub trait CapabilityRouter: Send + Sync {
    async fn capabilities(&self) -> Vec<Capability>;

    async fn invoke(
        &self,
        capability: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, RouteError>;
}

#[async_trait]
impl<L> CapabilityRouter for SessionManager<L>
where
    L: Launcher,
{
    async fn capabilities(&self) -> Vec<Capability> {
        SessionManager::capabilities(self).await
    }

    async fn invoke(
        &self,
        capability: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, RouteError> {
        SessionManager::invoke(self, capability, arguments).await
    }
}

#[async_trait]
impl<T> CapabilityRouter for Arc<T>
where
    T: CapabilityRouter + ?Sized,
{
    async fn capabilities(&self) -> Vec<Capability> {
        (**self).capabilities().await
    }

    async fn invoke(
        &self,
        capability: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, RouteError> {
        (**self).invoke(capability, arguments).await
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    #[default]
    Shopping,
    Checkout,
}

/// Everything one user-facing conversation carries between messages.
/// Never shared between conversations.
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    turns: Vec<ChatMessage>,
    cart: CartCache,
    mode: ConversationMode,
    checkout: Option<CheckoutSession>,
    last_search: Option<Value>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn cart(&self) -> &CartCache {
        &self.cart
    }

    pub fn mode(&self) -> ConversationMode {
        self.mode
    }

    pub fn checkout_session(&self) -> Option<&CheckoutSession> {
        self.checkout.as_ref()
    }

    pub fn last_search(&self) -> Option<&Value> {
        self.last_search.as_ref()
    }

    /// Switches to checkout mode with a fresh turn log.
    pub fn begin_checkout(&mut self) {
        self.mode = ConversationMode::Checkout;
        self.turns.clear();
    }

    fn checkout_completed(&self) -> bool {
        self.checkout.as_ref().map(|session| session.status == CheckoutStatus::Completed)
            == Some(true)
    }

    fn reset_after_checkout(&mut self) {
        self.cart.clear();
        self.checkout = None;
        self.mode = ConversationMode::Shopping;
        self.turns.clear();
    }

    fn record_session(&mut self, mut session: CheckoutSession) {
        session.cart = self.cart.items().to_vec();
        self.checkout = Some(session);
    }
}

/// The parts of a conversation a UI reads while a message may still be in
/// flight.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationSnapshot {
    pub cart: CartCache,
    pub mode: ConversationMode,
    pub checkout: Option<CheckoutSession>,
}

impl ConversationSnapshot {
    pub fn of(conversation: &Conversation) -> Self {
        Self {
            cart: conversation.cart.clone(),
            mode: conversation.mode,
            checkout: conversation.checkout.clone(),
        }
    }
}

pub struct Orchestrator<R> {
    router: R,
    llm: Arc<dyn LlmClient>,
    max_rounds: u32,
    snapshots: Option<watch::Sender<ConversationSnapshot>>,
}

impl<R> Orchestrator<R>
where
    R: CapabilityRouter,
{
    pub fn new(router: R, llm: Arc<dyn LlmClient>, max_rounds: u32) -> Self {
        Self { router, llm, max_rounds: max_rounds.max(1), snapshots: None }
    }

    /// Publishes a [`ConversationSnapshot`] after every capability call and at
    /// the end of every run.
    pub fn with_snapshots(mut self, snapshots: watch::Sender<ConversationSnapshot>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn publish(&self, conversation: &Conversation) {
        if let Some(snapshots) = &self.snapshots {
            snapshots.send_replace(ConversationSnapshot::of(conversation));
        }
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Runs one orchestration run and always yields text for the user.
    pub async fn handle_message(&self, conversation: &mut Conversation, text: &str) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        let mut run = conversation.turns.clone();
        run.push(ChatMessage::user(text));
        let mut gathered: Vec<String> = Vec::new();

        for round in 1..=self.max_rounds {
            let capabilities = self.router.capabilities().await;
            let tools: Vec<ToolSpec> = capabilities.iter().map(ToolSpec::from).collect();

            let mut messages = Vec::with_capacity(run.len() + 1);
            messages.push(ChatMessage::system(system_prompt(conversation.mode)));
            messages.extend(run.iter().cloned());

            debug!(
                event_name = "orchestrator.round",
                correlation_id = %correlation_id,
                round,
                message_count = messages.len(),
                tool_count = tools.len(),
                "calling llm"
            );

            let reply = match self.llm.chat(&messages, &tools).await {
                Ok(reply) => reply,
                Err(llm_error) => {
                    error!(
                        event_name = "orchestrator.llm_failed",
                        correlation_id = %correlation_id,
                        round,
                        error = %llm_error,
                        "llm call failed"
                    );
                    return format!("Error processing query: {llm_error}");
                }
            };

            if reply.tool_calls.is_empty() {
                if !reply.content.trim().is_empty() {
                    gathered.push(reply.content.clone());
                }
                run.push(ChatMessage::assistant(reply.content));
                let answer = gathered.join("\n");
                info!(
                    event_name = "orchestrator.completed",
                    correlation_id = %correlation_id,
                    rounds = round,
                    "orchestration run finished"
                );
                self.finish(conversation, run);
                return answer;
            }

            if !reply.content.trim().is_empty() {
                gathered.push(reply.content.clone());
            }

            let known: HashSet<&str> =
                capabilities.iter().map(|capability| capability.name.as_str()).collect();
            let mut executed: Vec<ToolCall> = Vec::new();
            let mut results: Vec<ChatMessage> = Vec::new();

            for call in reply.tool_calls {
                if !known.contains(call.name.as_str()) {
                    warn!(
                        event_name = "orchestrator.capability_not_found",
                        correlation_id = %correlation_id,
                        capability = %call.name,
                        "model requested an unregistered capability; skipping"
                    );
                    continue;
                }

                let Some(outcome) = self.execute(conversation, &call, &correlation_id).await else {
                    continue;
                };
                results.push(ChatMessage::tool_result(call.id.clone(), outcome.to_content()));
                executed.push(call);
            }

            if !executed.is_empty() {
                run.push(ChatMessage::tool_calls(reply.content, executed));
                run.extend(results);
            }
        }

        warn!(
            event_name = "orchestrator.round_limit",
            correlation_id = %correlation_id,
            max_rounds = self.max_rounds,
            "round limit reached without a final answer"
        );
        gathered.push(format!(
            "I stopped after {} rounds of tool calls without reaching a final answer. \
             Please rephrase or tell me how to continue.",
            self.max_rounds
        ));
        let answer = gathered.join("\n");
        run.push(ChatMessage::assistant(answer.clone()));
        self.finish(conversation, run);
        answer
    }

    fn finish(&self, conversation: &mut Conversation, run: Vec<ChatMessage>) {
        if conversation.checkout_completed() {
            conversation.reset_after_checkout();
        } else {
            conversation.turns = run;
        }
        self.publish(conversation);
    }

    /// Executes one requested call. `None` means the call never reached a
    /// backend because nothing owns that capability.
    async fn execute(
        &self,
        conversation: &mut Conversation,
        call: &ToolCall,
        correlation_id: &str,
    ) -> Option<ToolOutcome> {
        let Value::Object(mut arguments) = call.arguments.clone() else {
            return Some(ToolOutcome::error(format!(
                "Arguments for `{}` must be a JSON object",
                call.name
            )));
        };

        if let Err(message) = inject_arguments(conversation, &call.name, &mut arguments) {
            return Some(ToolOutcome::error(message));
        }

        debug!(
            event_name = "orchestrator.invoke",
            correlation_id = %correlation_id,
            capability = %call.name,
            "invoking capability"
        );

        let outcome = match self.router.invoke(&call.name, arguments).await {
            Ok(value) => ToolOutcome::from_result(value),
            Err(RouteError::NotFound(name)) => {
                warn!(
                    event_name = "orchestrator.capability_not_found",
                    correlation_id = %correlation_id,
                    capability = %name,
                    "capability disappeared before it could be invoked; skipping"
                );
                return None;
            }
            Err(RouteError::Session(session_error)) => ToolOutcome::error(session_error.to_string()),
        };

        self.apply_side_effects(conversation, &call.name, &outcome, correlation_id).await;
        self.publish(conversation);
        Some(outcome)
    }

    async fn apply_side_effects(
        &self,
        conversation: &mut Conversation,
        capability: &str,
        outcome: &ToolOutcome,
        correlation_id: &str,
    ) {
        if outcome.is_error() {
            return;
        }

        match capability {
            names::ADD_TO_CART | names::REMOVE_FROM_CART | names::GET_CART | names::CLEAR_CART => {
                conversation.cart.sync_from(outcome);
            }
            names::SEARCH_ITEMS => {
                conversation.last_search = Some(outcome.to_json());
            }
            names::AUTHENTICATE_USER
            | names::SELECT_PAYMENT_METHOD
            | names::SELECT_SHIPPING_ADDRESS
            | names::GET_CHECKOUT_SESSION => {
                if let Some(session) = outcome.decode::<CheckoutSession>() {
                    conversation.record_session(session);
                }
            }
            names::CANCEL_CHECKOUT => {
                conversation.checkout = None;
            }
            names::COMPLETE_CHECKOUT => {
                let Some(transaction) = outcome.decode::<Transaction>() else {
                    return;
                };
                info!(
                    event_name = "orchestrator.checkout_completed",
                    correlation_id = %correlation_id,
                    transaction_id = %transaction.id.0,
                    amount = %transaction.amount,
                    "checkout completed"
                );
                conversation.cart.clear();
                if let Some(session) = conversation.checkout.as_mut() {
                    session.status = CheckoutStatus::Completed;
                }
                self.clear_backend_cart(correlation_id).await;
            }
            _ => {}
        }
    }

    async fn clear_backend_cart(&self, correlation_id: &str) {
        let registered = self
            .router
            .capabilities()
            .await
            .iter()
            .any(|capability| capability.name == names::CLEAR_CART);
        if !registered {
            return;
        }

        if let Err(clear_error) = self.router.invoke(names::CLEAR_CART, Map::new()).await {
            warn!(
                event_name = "orchestrator.clear_cart_failed",
                correlation_id = %correlation_id,
                error = %clear_error,
                "backend cart could not be cleared after checkout"
            );
        }
    }
}

/// Adds the arguments the model is never trusted to supply itself.
fn inject_arguments(
    conversation: &Conversation,
    capability: &str,
    arguments: &mut Map<String, Value>,
) -> Result<(), String> {
    match capability {
        names::AUTHENTICATE_USER => {
            if let Some(user_id) = arguments.remove("user_id") {
                arguments.entry("identifier").or_insert(user_id);
            }
            arguments.insert("cart".to_string(), conversation.cart.to_json());
        }
        names::COMPLETE_CHECKOUT => {
            let Some(session) = conversation.checkout.as_ref() else {
                return Err(
                    "No authenticated checkout session. Call authenticate_user first.".to_string()
                );
            };
            arguments.insert("cart".to_string(), conversation.cart.to_json());
            arguments.insert("user_id".to_string(), Value::String(session.user_id.0.clone()));
            fill_session_id(session, arguments);
        }
        names::SELECT_PAYMENT_METHOD
        | names::SELECT_SHIPPING_ADDRESS
        | names::CANCEL_CHECKOUT
        | names::GET_CHECKOUT_SESSION => {
            if let Some(session) = conversation.checkout.as_ref() {
                fill_session_id(session, arguments);
            }
        }
        _ => {}
    }
    Ok(())
}

fn fill_session_id(session: &CheckoutSession, arguments: &mut Map<String, Value>) {
    arguments
        .entry("session_id")
        .or_insert_with(|| Value::String(session.session_id.0.clone()));
}
