use std::sync::Arc;
use std::time::Duration;

use concierge_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use concierge_core::config::OrchestrationConfig;
use concierge_core::domain::payload::FinalAnswer;
use concierge_core::domain::transcript::ConversationState;
use concierge_core::errors::{ErrorResult, OrchestrationError, RetryAttempt};
use concierge_core::routing::{RoutingStrategy, TerminationStrategy};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::OrchestrationEngine;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub attempt_timeout: Duration,
    pub backoff: Duration,
    /// `true` discards the transcript between attempts; `false` keeps it and re-appends the
    /// user message.
    pub reset_transcript_on_retry: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&OrchestrationConfig::default())
    }
}

impl From<&OrchestrationConfig> for RetryPolicy {
    fn from(config: &OrchestrationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            attempt_timeout: config.attempt_timeout(),
            backoff: config.retry_backoff(),
            reset_transcript_on_retry: config.reset_transcript_on_retry,
        }
    }
}

pub struct RetryController {
    policy: RetryPolicy,
    audit: Arc<dyn AuditSink>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, audit: Arc::new(NoopAuditSink) }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs up to `max_retries` attempts and returns the first answer, or the attempt log.
    pub async fn run<R, T>(
        &self,
        engine: &OrchestrationEngine<R, T>,
        user_message: &str,
    ) -> Result<FinalAnswer, ErrorResult>
    where
        R: RoutingStrategy,
        T: TerminationStrategy,
    {
        let mut state = ConversationState::new();
        let mut attempts = Vec::new();

        for attempt in 1..=self.policy.max_retries {
            if attempt > 1 {
                if self.policy.reset_transcript_on_retry {
                    state.reset(attempt);
                } else {
                    state.continue_as(attempt);
                }
            }

            let cancel = CancellationToken::new();
            let outcome = tokio::time::timeout(
                self.policy.attempt_timeout,
                engine.run(&mut state, user_message, &cancel),
            )
            .await;
            cancel.cancel();

            let error = match outcome {
                Ok(Ok(answer)) => {
                    info!(
                        event_name = "orchestration.attempt_succeeded",
                        session_id = %state.session_id(),
                        attempt,
                        "orchestration attempt produced an answer"
                    );
                    return Ok(answer);
                }
                Ok(Err(error)) => error,
                Err(_) => OrchestrationError::Timeout { after: self.policy.attempt_timeout },
            };

            warn!(
                event_name = "orchestration.attempt_failed",
                session_id = %state.session_id(),
                attempt,
                max_retries = self.policy.max_retries,
                kind = error.kind().as_str(),
                error = %error,
                "orchestration attempt failed"
            );
            self.audit.emit(
                AuditEvent::new(
                    state.session_id(),
                    attempt,
                    "orchestration.attempt_failed",
                    AuditCategory::Retry,
                    "retry-controller",
                    AuditOutcome::Failed,
                )
                .with_metadata("kind", error.kind().as_str())
                .with_metadata("error", error.to_string()),
            );
            attempts.push(RetryAttempt { attempt_number: attempt, error: Some(error) });

            if attempt < self.policy.max_retries && !self.policy.backoff.is_zero() {
                tokio::time::sleep(self.policy.backoff).await;
            }
        }

        let result = ErrorResult::from_attempts(attempts);
        warn!(
            event_name = "orchestration.retries_exhausted",
            session_id = %state.session_id(),
            attempts = result.attempts.len(),
            reason = %result.reason,
            "retry budget exhausted"
        );
        Err(result)
    }
}
