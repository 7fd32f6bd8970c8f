//! The seam between storefront capabilities and the MCP tool model.
//!
//! Backends advertise each [`Capability`] as an MCP [`Tool`] and answer calls
//! with a [`CallToolResult`] whose text content is the JSON result. On the
//! orchestrator side every result is normalized into a [`ToolOutcome`]
//! before anything else looks at it.

use std::fmt;
use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::capability::Capability;

impl Capability {
    /// Describes this capability as an MCP tool. A schema that is not a JSON
    /// object is replaced by an empty object schema.
    pub fn to_tool(&self) -> Tool {
        let schema = match &self.input_schema {
            Value::Object(map) => map.clone(),
            _ => JsonObject::new(),
        };
        Tool::new(self.name.clone(), self.description.clone(), Arc::new(schema))
    }

    pub fn from_tool(tool: &Tool) -> Self {
        Self::new(
            tool.name.to_string(),
            tool.description.as_deref().unwrap_or_default(),
            Value::Object(tool.input_schema.as_ref().clone()),
        )
    }
}

/// The single normalized shape every capability result takes once it has
/// crossed the protocol boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ToolOutcome {
    Value(Value),
    List(Vec<Value>),
    Error(String),
}

impl ToolOutcome {
    pub fn from_result(result: Value) -> Self {
        match result {
            Value::Array(items) => Self::List(items),
            other => Self::Value(other),
        }
    }

    /// Normalizes an MCP tool result. Structured content wins over text; text
    /// that is not JSON is kept as a plain string value.
    pub fn from_call_result(result: &CallToolResult) -> Self {
        let text = result
            .content
            .iter()
            .filter_map(|content| content.as_text())
            .map(|content| content.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error.unwrap_or(false) {
            if text.is_empty() {
                return Self::Error("capability failed without a message".to_string());
            }
            return Self::Error(text);
        }

        if let Some(structured) = &result.structured_content {
            return Self::from_result(structured.clone());
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Self::from_result(value),
            Err(_) => Self::Value(Value::String(text)),
        }
    }

    /// The MCP result a backend sends for this outcome.
    pub fn into_call_result(self) -> CallToolResult {
        match self {
            Self::Error(message) => CallToolResult::error(vec![Content::text(message)]),
            outcome => CallToolResult::success(vec![Content::text(outcome.to_content())]),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::List(items) => Value::Array(items.clone()),
            Self::Error(message) => serde_json::json!({ "error": message }),
        }
    }

    /// Text handed back to the model as the tool-result content.
    pub fn to_content(&self) -> String {
        self.to_json().to_string()
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Value(Value::Object(map)) => map.get(key),
            _ => None,
        }
    }

    /// Decodes a successful outcome into a typed value. Errors decode to `None`.
    pub fn decode<T>(&self) -> Option<T>
    where
        T: DeserializeOwned,
    {
        if self.is_error() {
            return None;
        }
        serde_json::from_value(self.to_json()).ok()
    }
}

impl<E> From<Result<Value, E>> for ToolOutcome
where
    E: fmt::Display,
{
    fn from(result: Result<Value, E>) -> Self {
        match result {
            Ok(value) => Self::from_result(value),
            Err(error) => Self::Error(error.to_string()),
        }
    }
}
