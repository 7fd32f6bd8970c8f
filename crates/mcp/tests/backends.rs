//! Drives the real backend binaries through the agent's session manager.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use storefront_agent::{
    AssistantReply, ChatMessage, LlmClient, LlmError, SessionManager, SessionState,
    ShoppingAssistant, ToolCall, ToolSpec,
};
use storefront_core::config::LaunchSpec;
use storefront_core::domain::checkout::CheckoutStatus;

fn spec(command: &str) -> LaunchSpec {
    LaunchSpec { command: command.to_string(), args: Vec::new(), handshake_timeout_secs: 10 }
}

fn fleet() -> Vec<(String, LaunchSpec)> {
    vec![
        ("catalog".to_string(), spec(env!("CARGO_BIN_EXE_storefront-catalog"))),
        ("payment".to_string(), spec(env!("CARGO_BIN_EXE_storefront-payment"))),
    ]
}

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

struct Script(Mutex<VecDeque<AssistantReply>>);

#[async_trait]
impl LlmClient for Script {
    async fn chat(&self, _: &[ChatMessage], _: &[ToolSpec]) -> Result<AssistantReply, LlmError> {
        self.0
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))
    }
}

fn call(id: &str, name: &str, arguments: Value) -> AssistantReply {
    AssistantReply::calls(vec![ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }])
}

#[tokio::test]
async fn both_backends_start_and_register_disjoint_capabilities() {
    let manager = SessionManager::with_processes();
    manager.start_all(fleet()).await.expect("start backends");

    let registry = manager.registry().await;
    assert_eq!(registry.len(), 18);
    assert_eq!(registry.resolve("get_items_by_category"), Some("catalog"));
    assert_eq!(registry.resolve("verify_email"), Some("payment"));

    let states = manager.session_states().await;
    assert!(states.iter().all(|status| status.state == SessionState::Ready));

    manager.stop_all().await;
    assert!(manager.session_states().await.is_empty());
}

#[tokio::test]
async fn missing_executable_fails_the_whole_batch() {
    let manager = SessionManager::with_processes();
    let mut specs = fleet();
    specs[1].1 = spec("/nonexistent/storefront-payment");

    let error = manager.start_all(specs).await.expect_err("payment cannot launch");
    assert!(error.to_string().contains("failed to launch backend `payment`"));
    assert!(manager.session_states().await.is_empty());
}

#[tokio::test]
async fn checkout_over_real_processes() {
    let manager = SessionManager::with_processes();
    manager.start_all(fleet()).await.expect("start backends");

    let added = manager
        .invoke("add_to_cart", args(json!({"item_id": "1", "quantity": 1})))
        .await
        .expect("add");
    let cart = added["cart"].clone();

    let session = manager
        .invoke("authenticate_user", args(json!({"identifier": "user1@example.com", "cart": cart})))
        .await
        .expect("authenticate");
    let session_id = session["session_id"].clone();
    assert_eq!(session["status"], "pending");

    let unknown = manager
        .invoke(
            "select_payment_method",
            args(json!({"session_id": session_id, "payment_method_id": "9"})),
        )
        .await
        .expect_err("not in wallet");
    assert!(unknown.to_string().contains("Payment method `9` not found"));

    manager
        .invoke("select_payment_method", args(json!({"session_id": session_id, "payment_method_id": "1"})))
        .await
        .expect("payment method");
    let ready = manager
        .invoke("select_shipping_address", args(json!({"session_id": session_id, "address_id": "1"})))
        .await
        .expect("address");
    assert_eq!(ready["status"], "ready");

    let transaction = manager
        .invoke("complete_checkout", args(json!({"session_id": session_id, "user_id": "user1"})))
        .await
        .expect("complete");
    let amount: Decimal = serde_json::from_value(transaction["amount"].clone()).expect("amount");
    assert_eq!(amount, Decimal::new(1999, 2));
    assert_eq!(transaction["items"][0]["name"], "Classic T-Shirt");

    manager.stop_all().await;
}

#[tokio::test]
async fn assistant_completes_a_purchase_end_to_end() {
    let manager = Arc::new(SessionManager::with_processes());
    manager.start_all(fleet()).await.expect("start backends");

    let llm = Script(Mutex::new(VecDeque::from(vec![
        call("c1", "add_to_cart", json!({"item_id": "10", "quantity": 1})),
        AssistantReply::text("Added the earbuds."),
        call("c2", "authenticate_user", json!({"identifier": "user1"})),
        AssistantReply::text("You're signed in."),
        AssistantReply::calls(vec![
            ToolCall {
                id: "c3".to_string(),
                name: "select_payment_method".to_string(),
                arguments: json!({"payment_method_id": "2"}),
            },
            ToolCall {
                id: "c4".to_string(),
                name: "select_shipping_address".to_string(),
                arguments: json!({"address_id": "1"}),
            },
        ]),
        AssistantReply::text("All set. Shall I place the order?"),
        call("c5", "complete_checkout", json!({})),
        AssistantReply::text("Your order is placed."),
    ])));
    let assistant = ShoppingAssistant::from_parts(manager.clone(), Arc::new(llm), 5);

    assistant.send_message("I want the wireless earbuds").await;
    assert_eq!(assistant.cart().await.total, Decimal::new(12999, 2));

    assistant.begin_checkout().await;
    assistant.send_message("user1").await;
    assistant.send_message("debit card, home address").await;
    let status = assistant.checkout_status().await;
    assert_eq!(status.status, Some(CheckoutStatus::Ready));
    assert!(status.missing_selections.is_empty());

    let reply = assistant.send_message("yes").await;
    assert_eq!(reply, "Your order is placed.");

    assert_eq!(assistant.cart().await.item_count, 0);
    assert!(assistant.checkout_status().await.session.is_none());
    let backend_cart = manager.invoke("get_cart", Map::new()).await.expect("cart");
    assert_eq!(backend_cart, json!([]));

    assistant.shutdown().await;
}
