use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use storefront_agent::{CartView, CheckoutView, ShoppingAssistant};
use tracing::info;

#[derive(Clone)]
pub struct ApiState {
    assistant: Arc<ShoppingAssistant>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub fn router(assistant: Arc<ShoppingAssistant>) -> Router {
    Router::new()
        .route("/api/messages", post(send_message))
        .route("/api/cart", get(cart))
        .route("/api/checkout", get(checkout))
        .route("/api/checkout/begin", post(begin_checkout))
        .with_state(ApiState { assistant })
}

async fn send_message(
    State(state): State<ApiState>,
    Json(body): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ApiError>)> {
    let text = body.text.trim();
    if text.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError { error: "message text is required".to_string() }),
        ));
    }

    info!(event_name = "api.message.received", chars = text.len(), "message received");
    let reply = state.assistant.send_message(text).await;
    Ok(Json(MessageResponse { reply }))
}

async fn cart(State(state): State<ApiState>) -> Json<CartView> {
    Json(state.assistant.cart().await)
}

async fn checkout(State(state): State<ApiState>) -> Json<CheckoutView> {
    Json(state.assistant.checkout_status().await)
}

async fn begin_checkout(State(state): State<ApiState>) -> Json<CheckoutView> {
    let view = state.assistant.begin_checkout().await;
    info!(event_name = "api.checkout.begin", "checkout mode entered");
    Json(view)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{Request, StatusCode},
        Json,
    };
    use rust_decimal::Decimal;
    use serde_json::Value;
    use storefront_agent::{
        AssistantReply, ChatMessage, ConversationMode, LlmClient, LlmError, SessionManager,
        ShoppingAssistant, ToolSpec,
    };
    use tower::ServiceExt;

    use super::*;

    struct Greeter;

    #[async_trait]
    impl LlmClient for Greeter {
        async fn chat(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<AssistantReply, LlmError> {
            let last = messages.last().map(|message| message.content.clone()).unwrap_or_default();
            Ok(AssistantReply::text(format!("You said: {last}")))
        }
    }

    /// An assistant with no backends and a model that echoes the user.
    pub(crate) fn idle_assistant() -> Arc<ShoppingAssistant> {
        Arc::new(ShoppingAssistant::from_parts(
            Arc::new(SessionManager::with_processes()),
            Arc::new(Greeter),
            5,
        ))
    }

    #[tokio::test]
    async fn send_message_returns_the_assistant_reply() {
        let state = State(ApiState { assistant: idle_assistant() });

        let Json(response) =
            send_message(state, Json(MessageRequest { text: " hi there ".to_string() }))
                .await
                .expect("should succeed");

        assert_eq!(response.reply, "You said: hi there");
    }

    #[tokio::test]
    async fn send_message_rejects_blank_text() {
        let state = State(ApiState { assistant: idle_assistant() });

        let (status, Json(error)) = send_message(state, Json(MessageRequest { text: "   ".to_string() }))
            .await
            .expect_err("blank text");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error.error.contains("required"));
    }

    #[tokio::test]
    async fn cart_starts_empty() {
        let Json(view) = cart(State(ApiState { assistant: idle_assistant() })).await;

        assert!(view.items.is_empty());
        assert_eq!(view.item_count, 0);
        assert_eq!(view.total, Decimal::ZERO);
    }

    #[tokio::test]
    async fn begin_checkout_switches_mode_through_the_router() {
        let assistant = idle_assistant();
        let app = router(assistant.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/checkout/begin")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload["mode"], "checkout");
        assert_eq!(payload["session"], Value::Null);
        assert_eq!(assistant.checkout_status().await.mode, ConversationMode::Checkout);
    }

    #[tokio::test]
    async fn messages_route_accepts_json() {
        let app = router(idle_assistant());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/messages")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"text":"show me shirts"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload["reply"], "You said: show me shirts");
    }
}
