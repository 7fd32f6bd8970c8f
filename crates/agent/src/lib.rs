//! Orchestration core for the storefront assistant.
//!
//! - `session` / `manager` / `registry`: bring up backend processes, discover
//!   their capabilities and route invocations by name.
//! - `llm` / `prompts`: the model boundary.
//! - `orchestrator`: the bounded tool-calling loop and per-conversation state.
//! - `assistant`: the facade a UI talks to.

pub mod assistant;
pub mod cart;
pub mod llm;
pub mod manager;
pub mod orchestrator;
pub mod prompts;
pub mod registry;
pub mod session;

#[cfg(test)]
mod test_support;

pub use assistant::{AssistantError, CartView, CheckoutView, ShoppingAssistant};
pub use cart::CartCache;
pub use llm::{AssistantReply, ChatMessage, LlmClient, LlmError, ToolCall, ToolSpec};
pub use manager::{Launcher, ProcessLauncher, RouteError, SessionManager, SessionStatus};
pub use orchestrator::{
    CapabilityRouter, Conversation, ConversationMode, ConversationSnapshot, Orchestrator,
};
pub use registry::CapabilityRegistry;
pub use session::{Session, SessionError, SessionState, Transport};
