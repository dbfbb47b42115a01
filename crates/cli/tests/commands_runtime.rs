use std::env;
use std::sync::{Mutex, OnceLock};

use concierge_cli::commands::{ask, config};
use serde_json::Value;

const TRIAGE: (&str, &str) = ("CONCIERGE_AGENTS_TRIAGE_URL", "http://127.0.0.1:9/triage");
const HEAD_SUPPORT: (&str, &str) =
    ("CONCIERGE_AGENTS_HEAD_SUPPORT_URL", "http://127.0.0.1:9/head-support");

#[test]
fn config_reports_sources_and_redacts_the_api_key() {
    with_env(
        &[
            TRIAGE,
            HEAD_SUPPORT,
            ("CONCIERGE_AGENTS_API_KEY", "super-secret-key"),
            ("CONCIERGE_ORCHESTRATION_MAX_RETRIES", "4"),
        ],
        || {
            let output = config::run();

            assert!(output.contains(
                "- orchestration.max_retries = 4 (source: env (CONCIERGE_ORCHESTRATION_MAX_RETRIES))"
            ));
            assert!(output.contains("- orchestration.max_iterations = 10 (source: default)"));
            assert!(output.contains("- agents.api_key = <redacted>"));
            assert!(!output.contains("super-secret-key"));
            assert!(output.contains("- translation = off"));
        },
    );
}

#[test]
fn config_reports_validation_failures() {
    with_env(&[], || {
        let output = config::run();
        assert!(output.starts_with("config validation failed:"));
        assert!(output.contains("agents.triage_url"));
    });
}

#[test]
fn ask_without_agent_endpoints_is_a_config_failure() {
    with_env(&[], || {
        let result = ask::run("What's the status of order 12345?", &[], false);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ask_rejects_malformed_history() {
    with_env(&[TRIAGE, HEAD_SUPPORT], || {
        let result = ask::run("order id 19328", &["no separator here".to_string()], false);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_history");
    });
}

#[test]
fn ask_falls_back_when_agents_are_unreachable() {
    with_env(
        &[
            TRIAGE,
            HEAD_SUPPORT,
            ("CONCIERGE_ORCHESTRATION_MAX_RETRIES", "1"),
            ("CONCIERGE_ORCHESTRATION_RETRY_BACKOFF_MS", "0"),
            ("CONCIERGE_FALLBACK_MESSAGE", "Please contact support."),
        ],
        || {
            let result = ask::run("What's the status of order 12345?", &[], false);
            assert_eq!(result.exit_code, 0, "fallback replies are still successful answers");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["messages"][0], "Please contact support.");
            assert_eq!(payload["need_more_info"], false);
        },
    );
}

#[test]
fn strict_ask_reports_the_last_failure_kind() {
    with_env(
        &[
            TRIAGE,
            HEAD_SUPPORT,
            ("CONCIERGE_ORCHESTRATION_MAX_RETRIES", "1"),
            ("CONCIERGE_ORCHESTRATION_RETRY_BACKOFF_MS", "0"),
        ],
        || {
            let result = ask::run("What's the status of order 12345?", &[], true);
            assert_eq!(result.exit_code, 1);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "run_failure");
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CONCIERGE_ORCHESTRATION_MAX_RETRIES",
        "CONCIERGE_ORCHESTRATION_MAX_ITERATIONS",
        "CONCIERGE_ORCHESTRATION_ATTEMPT_TIMEOUT_SECS",
        "CONCIERGE_ORCHESTRATION_RETRY_BACKOFF_MS",
        "CONCIERGE_ORCHESTRATION_RESET_TRANSCRIPT_ON_RETRY",
        "CONCIERGE_ROUTING_CQA_CONFIDENCE_THRESHOLD",
        "CONCIERGE_ROUTING_CLU_CONFIDENCE_THRESHOLD",
        "CONCIERGE_ROUTING_TRANSLATION_TURN_THRESHOLD",
        "CONCIERGE_AGENTS_TRIAGE_URL",
        "CONCIERGE_AGENTS_HEAD_SUPPORT_URL",
        "CONCIERGE_AGENTS_TRANSLATION_URL",
        "CONCIERGE_AGENTS_API_KEY",
        "CONCIERGE_AGENTS_REQUEST_TIMEOUT_SECS",
        "CONCIERGE_FALLBACK_MESSAGE",
        "CONCIERGE_FALLBACK_LANGUAGE",
        "CONCIERGE_SERVER_BIND_ADDRESS",
        "CONCIERGE_SERVER_PORT",
        "CONCIERGE_SERVER_STATIC_DIR",
        "CONCIERGE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "CONCIERGE_LOGGING_LEVEL",
        "CONCIERGE_LOGGING_FORMAT",
        "CONCIERGE_LOG_LEVEL",
        "CONCIERGE_LOG_FORMAT",
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
