use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use storefront_agent::{SessionState, SessionStatus, ShoppingAssistant};

#[derive(Clone)]
pub struct HealthState {
    assistant: Arc<ShoppingAssistant>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BackendCheck {
    pub id: String,
    pub status: &'static str,
    pub capability_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backends: Vec<BackendCheck>,
    pub checked_at: String,
}

pub fn router(assistant: Arc<ShoppingAssistant>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { assistant })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let statuses = state.assistant.session_states().await;
    let (status_code, payload) = evaluate(&statuses);
    (status_code, Json(payload))
}

/// Ready only when at least one backend is up and none has failed or
/// disconnected.
fn evaluate(statuses: &[SessionStatus]) -> (StatusCode, HealthResponse) {
    let ready =
        !statuses.is_empty() && statuses.iter().all(|status| status.state == SessionState::Ready);

    let backends = statuses
        .iter()
        .map(|status| BackendCheck {
            id: status.id.clone(),
            status: status.state.as_str(),
            capability_count: status.capability_count,
        })
        .collect();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        backends,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, payload)
}
