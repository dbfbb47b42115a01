use std::sync::Arc;

use concierge_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use concierge_core::config::AppConfig;
use concierge_core::domain::agent::AgentId;
use concierge_core::errors::ApplicationError;
use concierge_core::routing::{RoutingPolicy, TerminationPolicy};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::TracingAuditSink;
use crate::capability::CapabilityError;
use crate::engine::OrchestrationEngine;
use crate::fallback::{FallbackResponder, StaticFallback};
use crate::retry::{RetryController, RetryPolicy};
use crate::roster::AgentRoster;

pub const FALLBACK_FAILURE_MESSAGE: &str =
    "I encountered an error processing part of your message.";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub messages: Vec<String>,
    pub need_more_info: bool,
}

/// Flattens the utterance and prior turns into the single task handed to the engine.
pub fn task_string(message: &str, history: &[ChatTurn]) -> String {
    let mut task = format!("query: {message}");
    for turn in history {
        task.push_str(&format!(", {} - {}", turn.role, turn.content));
    }
    task
}

pub struct AgentRuntime {
    engine: OrchestrationEngine,
    retry: RetryController,
    fallback: Arc<dyn FallbackResponder>,
    fallback_language: String,
    audit: Arc<dyn AuditSink>,
}

impl AgentRuntime {
    pub fn new(
        roster: AgentRoster,
        config: &AppConfig,
        fallback: Arc<dyn FallbackResponder>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let routing = RoutingPolicy::new(config.routing.clone(), roster.ids());
        let termination =
            TerminationPolicy::new(&config.routing, roster.contains(AgentId::Translation));
        let engine = OrchestrationEngine::new(roster, routing, termination)
            .with_max_iterations(config.orchestration.max_iterations)
            .with_audit(audit.clone());
        let retry = RetryController::new(RetryPolicy::from(&config.orchestration))
            .with_audit(audit.clone());

        Self {
            engine,
            retry,
            fallback,
            fallback_language: config.fallback.language.clone(),
            audit,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, CapabilityError> {
        let roster = AgentRoster::from_config(config)?;
        Ok(Self::new(
            roster,
            config,
            Arc::new(StaticFallback::new(config.fallback.message.clone())),
            Arc::new(TracingAuditSink),
        ))
    }

    pub fn agents(&self) -> Vec<AgentId> {
        self.engine.roster().ids()
    }

    /// Runs orchestration without the fallback, surfacing exhaustion to the caller.
    pub async fn answer(
        &self,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<ChatReply, ApplicationError> {
        let task = task_string(message, history);
        let answer = self.retry.run(&self.engine, &task).await?;
        Ok(ChatReply {
            messages: vec![answer.response_text()],
            need_more_info: answer.need_more_info.is_set(),
        })
    }

    pub async fn handle_chat(&self, message: &str, history: &[ChatTurn]) -> ChatReply {
        match self.answer(message, history).await {
            Ok(reply) => reply,
            Err(failure) => {
                let fallback_id = Uuid::new_v4();
                let attempts = match &failure {
                    ApplicationError::Exhausted(exhausted) => exhausted.attempts.len(),
                    _ => 0,
                };
                warn!(
                    event_name = "orchestration.fallback_invoked",
                    fallback_id = %fallback_id,
                    attempts,
                    reason = %failure,
                    "orchestration exhausted, using fallback responder"
                );
                let text = self.fallback_answer(message, fallback_id).await;
                ChatReply { messages: vec![text], need_more_info: false }
            }
        }
    }

    async fn fallback_answer(&self, message: &str, fallback_id: Uuid) -> String {
        let event = |outcome: AuditOutcome| {
            AuditEvent::new(
                fallback_id,
                0,
                "orchestration.fallback_invoked",
                AuditCategory::Fallback,
                "agent-runtime",
                outcome,
            )
        };

        match self.fallback.respond(message, &self.fallback_language, fallback_id).await {
            Ok(text) => {
                info!(
                    event_name = "orchestration.fallback_answered",
                    fallback_id = %fallback_id,
                    "fallback responder produced an answer"
                );
                self.audit.emit(event(AuditOutcome::Success));
                text
            }
            Err(fallback_error) => {
                error!(
                    event_name = "orchestration.fallback_failed",
                    fallback_id = %fallback_id,
                    error = %fallback_error,
                    "fallback responder failed"
                );
                self.audit.emit(
                    event(AuditOutcome::Failed).with_metadata("error", fallback_error.to_string()),
                );
                FALLBACK_FAILURE_MESSAGE.to_string()
            }
        }
    }
}
