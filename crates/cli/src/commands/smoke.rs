use std::time::Instant;

use crate::commands::CommandResult;
use serde::Serialize;
use storefront_agent::SessionManager;
use storefront_core::config::{AppConfig, LoadOptions};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: String,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation".to_string(),
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation".to_string(),
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("backend_catalog"));
            checks.push(skipped("backend_payment"));
            checks.push(skipped("capability_routing"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "async_runtime".to_string(),
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let manager = SessionManager::with_processes();
    let mut all_started = true;
    for (id, spec) in config.backends.launch_order() {
        let name = format!("backend_{id}");
        if !all_started {
            checks.push(skipped(&name));
            continue;
        }

        let backend_started = Instant::now();
        match runtime.block_on(manager.start(&id, spec)) {
            Ok(session) => checks.push(SmokeCheck {
                name,
                status: SmokeStatus::Pass,
                elapsed_ms: backend_started.elapsed().as_millis() as u64,
                message: format!(
                    "`{}` offers {} capabilities",
                    session.server_name(),
                    session.list_capabilities().len()
                ),
            }),
            Err(error) => {
                all_started = false;
                checks.push(SmokeCheck {
                    name,
                    status: SmokeStatus::Fail,
                    elapsed_ms: backend_started.elapsed().as_millis() as u64,
                    message: error.to_string(),
                });
            }
        }
    }

    if all_started {
        let routing_started = Instant::now();
        let registry = runtime.block_on(manager.registry());
        checks.push(SmokeCheck {
            name: "capability_routing".to_string(),
            status: if registry.is_empty() { SmokeStatus::Fail } else { SmokeStatus::Pass },
            elapsed_ms: routing_started.elapsed().as_millis() as u64,
            message: format!("{} capabilities routable", registry.len()),
        });
    } else {
        checks.push(skipped("capability_routing"));
    }

    runtime.block_on(manager.stop_all());
    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &str) -> SmokeCheck {
    SmokeCheck {
        name: name.to_string(),
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due to a previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
