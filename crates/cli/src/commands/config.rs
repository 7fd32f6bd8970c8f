use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use storefront_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_key(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut push = |key: &str, value: String, env_keys: &[&str]| {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    };

    push("llm.provider", format!("{:?}", config.llm.provider), &["STOREFRONT_LLM_PROVIDER"]);
    push("llm.model", config.llm.model.clone(), &["STOREFRONT_LLM_MODEL"]);
    push(
        "llm.base_url",
        config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        &["STOREFRONT_LLM_BASE_URL"],
    );
    push("llm.api_key", api_key, &["STOREFRONT_LLM_API_KEY"]);
    push("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["STOREFRONT_LLM_TIMEOUT_SECS"]);
    push("llm.max_retries", config.llm.max_retries.to_string(), &["STOREFRONT_LLM_MAX_RETRIES"]);
    push(
        "orchestrator.max_rounds",
        config.orchestrator.max_rounds.to_string(),
        &["STOREFRONT_ORCHESTRATOR_MAX_ROUNDS"],
    );
    push(
        "backends.catalog.command",
        config.backends.catalog.command.clone(),
        &["STOREFRONT_CATALOG_COMMAND"],
    );
    push(
        "backends.payment.command",
        config.backends.payment.command.clone(),
        &["STOREFRONT_PAYMENT_COMMAND"],
    );
    push("server.bind_address", config.server.bind_address.clone(), &["STOREFRONT_SERVER_BIND_ADDRESS"]);
    push("server.port", config.server.port.to_string(), &["STOREFRONT_SERVER_PORT"]);
    push(
        "logging.level",
        config.logging.level.clone(),
        &["STOREFRONT_LOGGING_LEVEL", "STOREFRONT_LOG_LEVEL"],
    );
    push(
        "logging.format",
        format!("{:?}", config.logging.format),
        &["STOREFRONT_LOGGING_FORMAT", "STOREFRONT_LOG_FORMAT"],
    );

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("storefront.toml"), PathBuf::from("config/storefront.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a recognizable key prefix such as `sk-` and hides the rest.
fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
