use concierge_agent::runtime::{AgentRuntime, ChatTurn};
use concierge_core::config::{AppConfig, LoadOptions};
use concierge_core::errors::ApplicationError;

use crate::commands::CommandResult;

/// Parses `role:content` history entries given on the command line.
pub fn parse_history(entries: &[String]) -> Result<Vec<ChatTurn>, String> {
    entries
        .iter()
        .map(|entry| {
            let (role, content) = entry
                .split_once(':')
                .ok_or_else(|| format!("history entry `{entry}` must look like role:content"))?;
            let role = role.trim();
            if role.is_empty() {
                return Err(format!("history entry `{entry}` is missing a role"));
            }
            Ok(ChatTurn::new(role, content.trim()))
        })
        .collect()
}

/// With `strict`, exhausted orchestration is reported as a failure instead of the fallback answer.
pub fn run(message: &str, history: &[String], strict: bool) -> CommandResult {
    if message.trim().is_empty() {
        return CommandResult::failure("ask", "invalid_message", "message must not be empty", 2);
    }

    let history = match parse_history(history) {
        Ok(history) => history,
        Err(error) => return CommandResult::failure("ask", "invalid_history", error, 2),
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let agent_runtime = match AgentRuntime::from_config(&config) {
        Ok(agent_runtime) => agent_runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "agent_roster",
                format!("agent roster could not be built: {error}"),
                1,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let reply = if strict {
        match runtime.block_on(agent_runtime.answer(message, &history)) {
            Ok(reply) => reply,
            Err(failure) => {
                let error_class = match &failure {
                    ApplicationError::Exhausted(exhausted) => {
                        exhausted.last_kind.map(|kind| kind.as_str()).unwrap_or("exhausted")
                    }
                    ApplicationError::Integration(_) => "integration",
                    ApplicationError::Configuration(_) => "config_validation",
                };
                return CommandResult::failure("ask", error_class, failure.to_string(), 1);
            }
        }
    } else {
        runtime.block_on(agent_runtime.handle_chat(message, &history))
    };

    match serde_json::to_string(&reply) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("ask", "serialization", error.to_string(), 1),
    }
}
