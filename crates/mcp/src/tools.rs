use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use storefront_core::domain::capability::Capability;

use crate::McpError;

/// Describes a capability whose input schema is derived from `T`.
pub(crate) fn capability<T>(name: &str, description: &str) -> Capability
where
    T: JsonSchema,
{
    let schema = serde_json::to_value(schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    Capability::new(name, description, schema)
}

pub(crate) fn parse_args<T>(capability: &str, arguments: Map<String, Value>) -> Result<T, McpError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(Value::Object(arguments)).map_err(|error| McpError::InvalidArguments {
        capability: capability.to_string(),
        message: error.to_string(),
    })
}

pub(crate) fn to_json<T>(value: &T) -> Result<Value, McpError>
where
    T: serde::Serialize,
{
    Ok(serde_json::to_value(value)?)
}

/// Input for capabilities that take no arguments.
#[derive(Debug, Default, serde::Deserialize, JsonSchema)]
pub(crate) struct NoArguments {}
