//! Language-model boundary.
//!
//! The orchestrator only sees [`LlmClient`]: an ordered message list and the
//! capability specs go in, text and zero or more tool calls come out. Every
//! call is stateless, so the full context is resent each round.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use storefront_core::config::{LlmConfig, LlmProvider};
use storefront_core::domain::capability::Capability;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One requested capability invocation. `arguments` is whatever the model
/// produced; it is not guaranteed to be an object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self { tool_calls: calls, ..Self::plain(Role::Assistant, content) }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { tool_call_id: Some(call_id.into()), ..Self::plain(Role::Tool, content) }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&Capability> for ToolSpec {
    fn from(capability: &Capability) -> Self {
        Self {
            name: capability.name.clone(),
            description: capability.description.clone(),
            parameters: capability.input_schema.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssistantReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), tool_calls: Vec::new() }
    }

    pub fn calls(calls: Vec<ToolCall>) -> Self {
        Self { content: String::new(), tool_calls: calls }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response could not be understood: {0}")]
    InvalidResponse(String),
    #[error("llm client is misconfigured: {0}")]
    Configuration(String),
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(error) => error.is_timeout() || error.is_connect(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::Configuration(_) => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<AssistantReply, LlmError>;
}

/// Client for any `/chat/completions` endpoint that speaks the OpenAI tool
/// calling format. Ollama exposes the same surface under `/v1`.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const BACKOFF_BASE_MS: u64 = 250;
const BACKOFF_CAP_MS: u64 = 10_000;

/// Delay before retry number `attempt` (1-based): doubling from 500ms,
/// capped at ten seconds.
fn retry_backoff(attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(factor).min(BACKOFF_CAP_MS))
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = match (&config.base_url, config.provider) {
            (Some(base_url), _) => base_url.clone(),
            (None, LlmProvider::OpenAi) => OPENAI_BASE_URL.to_string(),
            (None, LlmProvider::Ollama) => {
                return Err(LlmError::Configuration("ollama requires llm.base_url".to_string()))
            }
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
        let messages: Vec<Value> = messages.iter().map(wire_message).collect();
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });

        if !tools.is_empty() {
            let tools: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = json!("auto");
        }

        body
    }

    async fn send_once(&self, body: &Value) -> Result<AssistantReply, LlmError> {
        let mut request = self.http.post(&self.endpoint).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let completion: CompletionResponse = response.json().await?;
        parse_completion(completion)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<AssistantReply, LlmError> {
        let body = self.request_body(messages, tools);
        let mut attempt = 0;

        loop {
            match self.send_once(&body).await {
                Ok(reply) => {
                    debug!(
                        event_name = "llm.reply",
                        model = %self.model,
                        tool_calls = reply.tool_calls.len(),
                        "llm replied"
                    );
                    return Ok(reply);
                }
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.retry",
                        attempt,
                        error = %error,
                        "llm request failed; retrying"
                    );
                    tokio::time::sleep(retry_backoff(attempt)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    Ok(Arc::new(OpenAiCompatibleClient::from_config(config)?))
}

fn wire_message(message: &ChatMessage) -> Value {
    match message.role {
        Role::System => json!({"role": "system", "content": message.content}),
        Role::User => json!({"role": "user", "content": message.content}),
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content,
        }),
        Role::Assistant if message.tool_calls.is_empty() => {
            json!({"role": "assistant", "content": message.content})
        }
        Role::Assistant => {
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {"name": call.name, "arguments": call.arguments.to_string()},
                    })
                })
                .collect();
            let content =
                if message.content.is_empty() { Value::Null } else { json!(message.content) };
            json!({"role": "assistant", "content": content, "tool_calls": calls})
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    tool_calls: Vec<CompletionToolCall>,
}

/// Plain replies often carry `"tool_calls": null`.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct CompletionToolCall {
    id: String,
    function: CompletionFunction,
}

#[derive(Debug, Deserialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn parse_completion(completion: CompletionResponse) -> Result<AssistantReply, LlmError> {
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| LlmError::InvalidResponse("no choices returned".to_string()))?;

    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            // Arguments arrive as a JSON string; anything unparsable is kept
            // verbatim so the orchestrator can report it back to the model.
            let raw = call.function.arguments;
            let arguments = if raw.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&raw).unwrap_or(Value::String(raw))
            };
            ToolCall { id: call.id, name: call.function.name, arguments }
        })
        .collect();

    Ok(AssistantReply { content: message.content.unwrap_or_default(), tool_calls })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use storefront_core::config::AppConfig;

    use std::time::Duration;

    use super::{
        parse_completion, retry_backoff, wire_message, ChatMessage, CompletionResponse,
        OpenAiCompatibleClient, ToolCall, ToolSpec,
    };

    #[test]
    fn completion_with_tool_calls_parses_arguments() {
        let completion: CompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"id": "call_1", "type": "function",
                         "function": {"name": "add_to_cart", "arguments": "{\"item_id\":\"1\",\"quantity\":2}"}},
                        {"id": "call_2", "type": "function",
                         "function": {"name": "get_cart", "arguments": "not json"}}
                    ]
                }
            }]
        }))
        .expect("completion");

        let reply = parse_completion(completion).expect("reply");
        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls.len(), 2);
        assert_eq!(reply.tool_calls[0].arguments["quantity"], 2);
        assert_eq!(reply.tool_calls[1].arguments, json!("not json"));
    }

    #[test]
    fn null_tool_calls_mean_a_plain_reply() {
        let completion: CompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "hello", "tool_calls": null}}]
        }))
        .expect("completion");

        let reply = parse_completion(completion).expect("reply");
        assert_eq!(reply.content, "hello");
        assert!(reply.tool_calls.is_empty());
    }

    #[test]
    fn backoff_doubles_then_stays_capped() {
        assert_eq!(retry_backoff(1), Duration::from_millis(500));
        assert_eq!(retry_backoff(3), Duration::from_millis(2_000));
        assert_eq!(retry_backoff(6), Duration::from_secs(10));
        assert_eq!(retry_backoff(56), Duration::from_secs(10));
        assert_eq!(retry_backoff(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn empty_choices_are_invalid() {
        let completion: CompletionResponse =
            serde_json::from_value(json!({"choices": []})).expect("completion");
        assert!(parse_completion(completion).is_err());
    }

    #[test]
    fn assistant_tool_call_turn_encodes_arguments_as_string() {
        let message = ChatMessage::tool_calls(
            "",
            vec![ToolCall { id: "c1".to_string(), name: "get_cart".to_string(), arguments: json!({}) }],
        );
        let wire = wire_message(&message);
        assert_eq!(wire["content"], serde_json::Value::Null);
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], "{}");

        let result = wire_message(&ChatMessage::tool_result("c1", "[]"));
        assert_eq!(result["role"], "tool");
        assert_eq!(result["tool_call_id"], "c1");
    }

    #[test]
    fn request_body_offers_tools_with_auto_choice() {
        let config = AppConfig::default();
        let client = OpenAiCompatibleClient::from_config(&config.llm).expect("client");
        assert_eq!(client.endpoint, "http://localhost:11434/v1/chat/completions");

        let tools = vec![ToolSpec {
            name: "list_items".to_string(),
            description: "List all items".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let body = client.request_body(&[ChatMessage::user("hi")], &tools);
        assert_eq!(body["model"], "llama3.1");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "list_items");

        let bare = client.request_body(&[ChatMessage::user("hi")], &[]);
        assert!(bare.get("tools").is_none());
    }
}
