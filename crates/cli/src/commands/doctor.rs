use std::path::Path;

use serde::Serialize;
use storefront_core::config::{AppConfig, LaunchSpec, LlmProvider, LoadOptions};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation".to_string(),
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            for (id, spec) in config.backends.launch_order() {
                checks.push(check_backend_executable(&id, &spec));
            }
            checks.push(check_llm_settings(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation".to_string(),
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["backend_catalog", "backend_payment", "llm_settings"] {
                checks.push(DoctorCheck {
                    name: name.to_string(),
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// A command with a path separator must exist as given; a bare name must
/// resolve on `PATH`.
fn check_backend_executable(id: &str, spec: &LaunchSpec) -> DoctorCheck {
    let name = format!("backend_{id}");
    let resolved = if spec.command.contains(std::path::MAIN_SEPARATOR) {
        Path::new(&spec.command).is_file().then(|| Path::new(&spec.command).to_path_buf())
    } else {
        which::which(&spec.command).ok()
    };

    match resolved {
        Some(path) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("`{}` resolves to {}", spec.command, path.display()),
        },
        None => DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: format!("`{}` was not found; build it or set its command", spec.command),
        },
    }
}

fn check_llm_settings(config: &AppConfig) -> DoctorCheck {
    let endpoint = config.llm.base_url.as_deref().unwrap_or("https://api.openai.com/v1");
    let provider = match config.llm.provider {
        LlmProvider::OpenAi => "openai",
        LlmProvider::Ollama => "ollama",
    };
    DoctorCheck {
        name: "llm_settings".to_string(),
        status: CheckStatus::Pass,
        details: format!("{provider} model `{}` at {endpoint}", config.llm.model),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use storefront_core::config::LaunchSpec;

    use super::{check_backend_executable, CheckStatus};

    fn spec(command: &str) -> LaunchSpec {
        LaunchSpec { command: command.to_string(), args: Vec::new(), handshake_timeout_secs: 10 }
    }

    #[test]
    fn missing_backend_path_fails() {
        let check = check_backend_executable("catalog", &spec("/nonexistent/storefront-catalog"));
        assert_eq!(check.name, "backend_catalog");
        assert_eq!(check.status, CheckStatus::Fail);
    }

    #[test]
    fn existing_backend_path_passes() {
        let current = std::env::current_exe().expect("test binary path");
        let check = check_backend_executable("payment", &spec(&current.display().to_string()));
        assert_eq!(check.status, CheckStatus::Pass);
    }
}
