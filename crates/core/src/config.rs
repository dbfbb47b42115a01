use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "concierge.toml";
pub const NESTED_CONFIG_FILE: &str = "config/concierge.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub orchestration: OrchestrationConfig,
    pub routing: RoutingConfig,
    pub agents: AgentsConfig,
    pub fallback: FallbackConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestrationConfig {
    pub max_retries: u32,
    pub max_iterations: u32,
    pub attempt_timeout_secs: u64,
    pub retry_backoff_ms: u64,
    pub reset_transcript_on_retry: bool,
}

/// Immutable thresholds handed to the routing and termination policies at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutingConfig {
    pub cqa_confidence_threshold: f64,
    /// `None` disables confidence gating on the intent-classification path.
    pub clu_confidence_threshold: Option<f64>,
    pub translation_turn_threshold: usize,
}

#[derive(Clone, Debug)]
pub struct AgentsConfig {
    pub triage_url: Option<String>,
    pub head_support_url: Option<String>,
    pub translation_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackConfig {
    pub message: String,
    pub language: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub triage_url: Option<String>,
    pub head_support_url: Option<String>,
    pub translation_url: Option<String>,
    pub max_retries: Option<u32>,
    pub attempt_timeout_secs: Option<u64>,
    pub reset_transcript_on_retry: Option<bool>,
    pub cqa_confidence_threshold: Option<f64>,
    pub static_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            orchestration: OrchestrationConfig::default(),
            routing: RoutingConfig::default(),
            agents: AgentsConfig {
                triage_url: None,
                head_support_url: None,
                translation_url: None,
                api_key: None,
                request_timeout_secs: 60,
            },
            fallback: FallbackConfig {
                message: "I'm sorry, I couldn't find an answer to that. Please contact support for further help."
                    .to_string(),
                language: "en".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 7000,
                static_dir: None,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_iterations: 10,
            attempt_timeout_secs: 120,
            retry_backoff_ms: 2_000,
            reset_transcript_on_retry: true,
        }
    }
}

impl OrchestrationConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

pub const DEFAULT_CLU_CONFIDENCE_THRESHOLD: f64 = 0.5;

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            cqa_confidence_threshold: 0.5,
            clu_confidence_threshold: Some(DEFAULT_CLU_CONFIDENCE_THRESHOLD),
            translation_turn_threshold: 3,
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn translation_enabled(&self) -> bool {
        self.agents.translation_url.is_some()
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(orchestration) = patch.orchestration {
            if let Some(max_retries) = orchestration.max_retries {
                self.orchestration.max_retries = max_retries;
            }
            if let Some(max_iterations) = orchestration.max_iterations {
                self.orchestration.max_iterations = max_iterations;
            }
            if let Some(attempt_timeout_secs) = orchestration.attempt_timeout_secs {
                self.orchestration.attempt_timeout_secs = attempt_timeout_secs;
            }
            if let Some(retry_backoff_ms) = orchestration.retry_backoff_ms {
                self.orchestration.retry_backoff_ms = retry_backoff_ms;
            }
            if let Some(reset) = orchestration.reset_transcript_on_retry {
                self.orchestration.reset_transcript_on_retry = reset;
            }
        }

        if let Some(routing) = patch.routing {
            if let Some(threshold) = routing.cqa_confidence_threshold {
                self.routing.cqa_confidence_threshold = threshold;
            }
            if let Some(threshold) = routing.clu_confidence_threshold {
                self.routing.clu_confidence_threshold = Some(threshold);
            }
            match routing.clu_gate {
                Some(false) => self.routing.clu_confidence_threshold = None,
                Some(true) if self.routing.clu_confidence_threshold.is_none() => {
                    self.routing.clu_confidence_threshold = Some(DEFAULT_CLU_CONFIDENCE_THRESHOLD);
                }
                _ => {}
            }
            if let Some(turns) = routing.translation_turn_threshold {
                self.routing.translation_turn_threshold = turns;
            }
        }

        if let Some(agents) = patch.agents {
            if let Some(url) = agents.triage_url {
                self.agents.triage_url = Some(url);
            }
            if let Some(url) = agents.head_support_url {
                self.agents.head_support_url = Some(url);
            }
            if let Some(url) = agents.translation_url {
                self.agents.translation_url = Some(url);
            }
            if let Some(api_key_value) = agents.api_key {
                self.agents.api_key = Some(api_key_value.into());
            }
            if let Some(request_timeout_secs) = agents.request_timeout_secs {
                self.agents.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(fallback) = patch.fallback {
            if let Some(message) = fallback.message {
                self.fallback.message = message;
            }
            if let Some(language) = fallback.language {
                self.fallback.language = language;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(static_dir) = server.static_dir {
                self.server.static_dir = Some(static_dir);
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CONCIERGE_ORCHESTRATION_MAX_RETRIES") {
            self.orchestration.max_retries =
                parse_value("CONCIERGE_ORCHESTRATION_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_ORCHESTRATION_MAX_ITERATIONS") {
            self.orchestration.max_iterations =
                parse_value("CONCIERGE_ORCHESTRATION_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_ORCHESTRATION_ATTEMPT_TIMEOUT_SECS") {
            self.orchestration.attempt_timeout_secs =
                parse_value("CONCIERGE_ORCHESTRATION_ATTEMPT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_ORCHESTRATION_RETRY_BACKOFF_MS") {
            self.orchestration.retry_backoff_ms =
                parse_value("CONCIERGE_ORCHESTRATION_RETRY_BACKOFF_MS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_ORCHESTRATION_RESET_TRANSCRIPT_ON_RETRY") {
            self.orchestration.reset_transcript_on_retry =
                parse_value("CONCIERGE_ORCHESTRATION_RESET_TRANSCRIPT_ON_RETRY", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_ROUTING_CQA_CONFIDENCE_THRESHOLD") {
            self.routing.cqa_confidence_threshold =
                parse_value("CONCIERGE_ROUTING_CQA_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_ROUTING_CLU_CONFIDENCE_THRESHOLD") {
            self.routing.clu_confidence_threshold = match value.trim().to_ascii_lowercase().as_str()
            {
                "off" | "none" | "disabled" => None,
                _ => Some(parse_value("CONCIERGE_ROUTING_CLU_CONFIDENCE_THRESHOLD", &value)?),
            };
        }
        if let Some(value) = read_env("CONCIERGE_ROUTING_TRANSLATION_TURN_THRESHOLD") {
            self.routing.translation_turn_threshold =
                parse_value("CONCIERGE_ROUTING_TRANSLATION_TURN_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_AGENTS_TRIAGE_URL") {
            self.agents.triage_url = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_AGENTS_HEAD_SUPPORT_URL") {
            self.agents.head_support_url = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_AGENTS_TRANSLATION_URL") {
            self.agents.translation_url = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_AGENTS_API_KEY") {
            self.agents.api_key = Some(value.into());
        }
        if let Some(value) = read_env("CONCIERGE_AGENTS_REQUEST_TIMEOUT_SECS") {
            self.agents.request_timeout_secs =
                parse_value("CONCIERGE_AGENTS_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_FALLBACK_MESSAGE") {
            self.fallback.message = value;
        }
        if let Some(value) = read_env("CONCIERGE_FALLBACK_LANGUAGE") {
            self.fallback.language = value;
        }

        if let Some(value) = read_env("CONCIERGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CONCIERGE_SERVER_PORT") {
            self.server.port = parse_value("CONCIERGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_SERVER_STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("CONCIERGE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_value("CONCIERGE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("CONCIERGE_LOGGING_LEVEL").or_else(|| read_env("CONCIERGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CONCIERGE_LOGGING_FORMAT").or_else(|| read_env("CONCIERGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(url) = overrides.triage_url {
            self.agents.triage_url = Some(url);
        }
        if let Some(url) = overrides.head_support_url {
            self.agents.head_support_url = Some(url);
        }
        if let Some(url) = overrides.translation_url {
            self.agents.translation_url = Some(url);
        }
        if let Some(max_retries) = overrides.max_retries {
            self.orchestration.max_retries = max_retries;
        }
        if let Some(attempt_timeout_secs) = overrides.attempt_timeout_secs {
            self.orchestration.attempt_timeout_secs = attempt_timeout_secs;
        }
        if let Some(reset) = overrides.reset_transcript_on_retry {
            self.orchestration.reset_transcript_on_retry = reset;
        }
        if let Some(threshold) = overrides.cqa_confidence_threshold {
            self.routing.cqa_confidence_threshold = threshold;
        }
        if let Some(static_dir) = overrides.static_dir {
            self.server.static_dir = Some(static_dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_orchestration(&self.orchestration)?;
        validate_routing(&self.routing)?;
        validate_agents(&self.agents)?;
        validate_fallback(&self.fallback)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The file `load` would read for the given explicit path, if any exists.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_orchestration(orchestration: &OrchestrationConfig) -> Result<(), ConfigError> {
    if orchestration.max_retries == 0 || orchestration.max_retries > 10 {
        return Err(ConfigError::Validation(
            "orchestration.max_retries must be in range 1..=10".to_string(),
        ));
    }

    if orchestration.max_iterations == 0 || orchestration.max_iterations > 50 {
        return Err(ConfigError::Validation(
            "orchestration.max_iterations must be in range 1..=50".to_string(),
        ));
    }

    if orchestration.attempt_timeout_secs == 0 || orchestration.attempt_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "orchestration.attempt_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if orchestration.retry_backoff_ms > 60_000 {
        return Err(ConfigError::Validation(
            "orchestration.retry_backoff_ms must not exceed 60000".to_string(),
        ));
    }

    Ok(())
}

fn validate_routing(routing: &RoutingConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&routing.cqa_confidence_threshold) {
        return Err(ConfigError::Validation(
            "routing.cqa_confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if let Some(threshold) = routing.clu_confidence_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Validation(
                "routing.clu_confidence_threshold must be in range 0.0..=1.0".to_string(),
            ));
        }
    }

    if routing.translation_turn_threshold == 0 {
        return Err(ConfigError::Validation(
            "routing.translation_turn_threshold must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_agents(agents: &AgentsConfig) -> Result<(), ConfigError> {
    let required = [
        ("agents.triage_url", &agents.triage_url),
        ("agents.head_support_url", &agents.head_support_url),
    ];
    for (key, value) in required {
        let missing = value.as_ref().map(|url| url.trim().is_empty()).unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(format!(
                "{key} is required (set it in concierge.toml or via CONCIERGE_{})",
                key.to_ascii_uppercase().replace('.', "_")
            )));
        }
    }

    let all = [
        ("agents.triage_url", &agents.triage_url),
        ("agents.head_support_url", &agents.head_support_url),
        ("agents.translation_url", &agents.translation_url),
    ];
    for (key, value) in all {
        if let Some(url) = value {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "{key} must start with http:// or https://"
                )));
            }
        }
    }

    if agents.request_timeout_secs == 0 || agents.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "agents.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_fallback(fallback: &FallbackConfig) -> Result<(), ConfigError> {
    if fallback.message.trim().is_empty() {
        return Err(ConfigError::Validation("fallback.message must not be empty".to_string()));
    }
    if fallback.language.trim().is_empty() {
        return Err(ConfigError::Validation("fallback.language must not be empty".to_string()));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    orchestration: Option<OrchestrationPatch>,
    routing: Option<RoutingPatch>,
    agents: Option<AgentsPatch>,
    fallback: Option<FallbackPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct OrchestrationPatch {
    max_retries: Option<u32>,
    max_iterations: Option<u32>,
    attempt_timeout_secs: Option<u64>,
    retry_backoff_ms: Option<u64>,
    reset_transcript_on_retry: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    cqa_confidence_threshold: Option<f64>,
    clu_confidence_threshold: Option<f64>,
    clu_gate: Option<bool>,
    translation_turn_threshold: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentsPatch {
    triage_url: Option<String>,
    head_support_url: Option<String>,
    translation_url: Option<String>,
    api_key: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FallbackPatch {
    message: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
