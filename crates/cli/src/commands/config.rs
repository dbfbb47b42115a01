use std::env;
use std::fs;
use std::path::Path;

use concierge_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let orchestration = &config.orchestration;
    let routing = &config.routing;
    let agents = &config.agents;

    let fields: Vec<(&str, String, &str)> = vec![
        (
            "orchestration.max_retries",
            orchestration.max_retries.to_string(),
            "CONCIERGE_ORCHESTRATION_MAX_RETRIES",
        ),
        (
            "orchestration.max_iterations",
            orchestration.max_iterations.to_string(),
            "CONCIERGE_ORCHESTRATION_MAX_ITERATIONS",
        ),
        (
            "orchestration.attempt_timeout_secs",
            orchestration.attempt_timeout_secs.to_string(),
            "CONCIERGE_ORCHESTRATION_ATTEMPT_TIMEOUT_SECS",
        ),
        (
            "orchestration.retry_backoff_ms",
            orchestration.retry_backoff_ms.to_string(),
            "CONCIERGE_ORCHESTRATION_RETRY_BACKOFF_MS",
        ),
        (
            "orchestration.reset_transcript_on_retry",
            orchestration.reset_transcript_on_retry.to_string(),
            "CONCIERGE_ORCHESTRATION_RESET_TRANSCRIPT_ON_RETRY",
        ),
        (
            "routing.cqa_confidence_threshold",
            routing.cqa_confidence_threshold.to_string(),
            "CONCIERGE_ROUTING_CQA_CONFIDENCE_THRESHOLD",
        ),
        (
            "routing.clu_confidence_threshold",
            routing
                .clu_confidence_threshold
                .map(|threshold| threshold.to_string())
                .unwrap_or_else(|| "<disabled>".to_string()),
            "CONCIERGE_ROUTING_CLU_CONFIDENCE_THRESHOLD",
        ),
        (
            "routing.translation_turn_threshold",
            routing.translation_turn_threshold.to_string(),
            "CONCIERGE_ROUTING_TRANSLATION_TURN_THRESHOLD",
        ),
        ("agents.triage_url", optional(&agents.triage_url), "CONCIERGE_AGENTS_TRIAGE_URL"),
        (
            "agents.head_support_url",
            optional(&agents.head_support_url),
            "CONCIERGE_AGENTS_HEAD_SUPPORT_URL",
        ),
        (
            "agents.translation_url",
            optional(&agents.translation_url),
            "CONCIERGE_AGENTS_TRANSLATION_URL",
        ),
        (
            "agents.api_key",
            if agents.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
            "CONCIERGE_AGENTS_API_KEY",
        ),
        (
            "agents.request_timeout_secs",
            agents.request_timeout_secs.to_string(),
            "CONCIERGE_AGENTS_REQUEST_TIMEOUT_SECS",
        ),
        ("fallback.message", config.fallback.message.clone(), "CONCIERGE_FALLBACK_MESSAGE"),
        ("fallback.language", config.fallback.language.clone(), "CONCIERGE_FALLBACK_LANGUAGE"),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            "CONCIERGE_SERVER_BIND_ADDRESS",
        ),
        ("server.port", config.server.port.to_string(), "CONCIERGE_SERVER_PORT"),
        (
            "server.static_dir",
            config
                .server
                .static_dir
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            "CONCIERGE_SERVER_STATIC_DIR",
        ),
        ("logging.level", config.logging.level.clone(), "CONCIERGE_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "CONCIERGE_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        fields.into_iter().map(|(key, value, env_key)| render_line(key, &value, source(key, env_key))),
    );
    lines.push(format!("- translation = {}", if config.translation_enabled() { "on" } else { "off" }));

    lines.join("\n")
}

fn optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "<unset>".to_string())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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
