use std::env;
use std::sync::{Mutex, OnceLock};

use storefront_cli::commands::{config, doctor, smoke};
use serde_json::Value;

#[test]
fn config_reports_defaults_with_sources() {
    with_env(&[], || {
        let output = config::run();

        assert!(output.starts_with("effective config"));
        assert!(output.contains("- llm.provider = Ollama (source: default)"));
        assert!(output.contains("- orchestrator.max_rounds = 5 (source: default)"));
        assert!(output.contains("- llm.api_key = <unset> (source: default)"));
    });
}

#[test]
fn config_redacts_api_key_and_attributes_env() {
    with_env(
        &[
            ("STOREFRONT_LLM_PROVIDER", "openai"),
            ("STOREFRONT_LLM_API_KEY", "sk-very-secret"),
            ("STOREFRONT_LOG_LEVEL", "debug"),
        ],
        || {
            let output = config::run();

            assert!(output.contains("- llm.api_key = sk-*** (source: env (STOREFRONT_LLM_API_KEY))"));
            assert!(!output.contains("very-secret"));
            assert!(output.contains("- logging.level = debug (source: env (STOREFRONT_LOG_LEVEL))"));
        },
    );
}

#[test]
fn config_reports_validation_failure() {
    with_env(&[("STOREFRONT_ORCHESTRATOR_MAX_ROUNDS", "0")], || {
        let output = config::run();
        assert!(output.starts_with("config validation failed"));
    });
}

#[test]
fn doctor_fails_when_backends_are_missing() {
    with_env(
        &[
            ("STOREFRONT_CATALOG_COMMAND", "/nonexistent/storefront-catalog"),
            ("STOREFRONT_PAYMENT_COMMAND", "/nonexistent/storefront-payment"),
        ],
        || {
            let payload = parse_payload(&doctor::run(true));

            assert_eq!(payload["overall_status"], "fail");
            let checks = payload["checks"].as_array().expect("checks");
            assert_eq!(checks[0]["name"], "config_validation");
            assert_eq!(checks[0]["status"], "pass");
            assert_eq!(checks[1]["name"], "backend_catalog");
            assert_eq!(checks[1]["status"], "fail");
            assert_eq!(checks[3]["name"], "llm_settings");
        },
    );
}

#[test]
fn doctor_skips_checks_when_config_invalid() {
    with_env(&[("STOREFRONT_LLM_PROVIDER", "openai")], || {
        let output = doctor::run(false);

        assert!(output.starts_with("doctor: one or more readiness checks failed"));
        assert!(output.contains("- [fail] config_validation"));
        assert!(output.contains("- [skip] backend_catalog"));
    });
}

#[test]
fn smoke_returns_failure_when_config_invalid() {
    with_env(&[("STOREFRONT_ORCHESTRATOR_MAX_ROUNDS", "99")], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 6, "expected smoke failure code");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn smoke_reports_backend_launch_failure() {
    with_env(&[("STOREFRONT_CATALOG_COMMAND", "/nonexistent/storefront-catalog")], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["checks"][1]["name"], "backend_catalog");
        assert_eq!(payload["checks"][1]["status"], "fail");
        assert_eq!(payload["checks"][2]["status"], "skipped");
        assert_eq!(payload["checks"][3]["name"], "capability_routing");
        assert_eq!(payload["checks"][3]["status"], "skipped");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "STOREFRONT_LLM_PROVIDER",
        "STOREFRONT_LLM_API_KEY",
        "STOREFRONT_LLM_BASE_URL",
        "STOREFRONT_LLM_MODEL",
        "STOREFRONT_LLM_TIMEOUT_SECS",
        "STOREFRONT_LLM_MAX_RETRIES",
        "STOREFRONT_ORCHESTRATOR_MAX_ROUNDS",
        "STOREFRONT_CATALOG_COMMAND",
        "STOREFRONT_PAYMENT_COMMAND",
        "STOREFRONT_BACKEND_HANDSHAKE_TIMEOUT_SECS",
        "STOREFRONT_SERVER_BIND_ADDRESS",
        "STOREFRONT_SERVER_PORT",
        "STOREFRONT_LOGGING_LEVEL",
        "STOREFRONT_LOGGING_FORMAT",
        "STOREFRONT_LOG_LEVEL",
        "STOREFRONT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
