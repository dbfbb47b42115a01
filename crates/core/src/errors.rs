use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::domain::agent::AgentId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ParseError,
    LowConfidence,
    NoRoute,
    RunFailure,
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseError => "parse_error",
            Self::LowConfidence => "low_confidence",
            Self::NoRoute => "no_route",
            Self::RunFailure => "run_failure",
            Self::Timeout => "timeout",
        }
    }
}

/// Failures of a single orchestration attempt. Every variant is retryable.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum OrchestrationError {
    #[error("could not parse payload from {author}: {detail}")]
    Parse { author: String, detail: String },
    #[error("{kind} confidence {score} is below threshold {threshold}")]
    LowConfidence { kind: &'static str, score: f64, threshold: f64 },
    #[error("no route: {reason}")]
    NoRoute { reason: String },
    #[error("{agent} did not complete: {detail}")]
    RunFailure { agent: AgentId, detail: String },
    #[error("attempt timed out after {after:?}")]
    Timeout { after: Duration },
}

impl OrchestrationError {
    pub fn no_route(reason: impl Into<String>) -> Self {
        Self::NoRoute { reason: reason.into() }
    }

    pub fn parse(author: impl Into<String>, detail: impl ToString) -> Self {
        Self::Parse { author: author.into(), detail: detail.to_string() }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Parse { .. } => FailureKind::ParseError,
            Self::LowConfidence { .. } => FailureKind::LowConfidence,
            Self::NoRoute { .. } => FailureKind::NoRoute,
            Self::RunFailure { .. } => FailureKind::RunFailure,
            Self::Timeout { .. } => FailureKind::Timeout,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub error: Option<OrchestrationError>,
}

/// Structured outcome once the retry budget is spent.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("orchestration failed after {} attempt(s): {reason}", .attempts.len())]
pub struct ErrorResult {
    pub reason: String,
    pub last_kind: Option<FailureKind>,
    pub attempts: Vec<RetryAttempt>,
}

impl ErrorResult {
    pub fn from_attempts(attempts: Vec<RetryAttempt>) -> Self {
        let last_error = attempts.iter().rev().find_map(|attempt| attempt.error.as_ref());
        let reason = last_error
            .map(ToString::to_string)
            .unwrap_or_else(|| "no attempt was made".to_string());
        let last_kind = last_error.map(OrchestrationError::kind);
        Self { reason, last_kind, attempts }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Exhausted(#[from] ErrorResult),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected error occurred",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Exhausted(result) => {
                InterfaceError::ServiceUnavailable { message: result.reason, correlation_id }
            }
            Self::Integration(message) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Configuration(message) => InterfaceError::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::domain::agent::AgentId;
    use crate::errors::{
        ApplicationError, ErrorResult, FailureKind, InterfaceError, OrchestrationError,
        RetryAttempt,
    };

    #[test]
    fn every_failure_maps_to_its_kind() {
        let cases = [
            (OrchestrationError::parse("TriageAgent", "eof"), FailureKind::ParseError),
            (
                OrchestrationError::LowConfidence { kind: "cqa", score: 0.2, threshold: 0.5 },
                FailureKind::LowConfidence,
            ),
            (OrchestrationError::no_route("unknown agent"), FailureKind::NoRoute),
            (
                OrchestrationError::RunFailure {
                    agent: AgentId::Triage,
                    detail: "status failed".to_string(),
                },
                FailureKind::RunFailure,
            ),
            (OrchestrationError::Timeout { after: Duration::from_secs(1) }, FailureKind::Timeout),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
        }
    }

    #[test]
    fn error_result_reports_last_failure() {
        let result = ErrorResult::from_attempts(vec![
            RetryAttempt {
                attempt_number: 1,
                error: Some(OrchestrationError::no_route("first")),
            },
            RetryAttempt {
                attempt_number: 2,
                error: Some(OrchestrationError::Timeout { after: Duration::from_millis(5) }),
            },
        ]);

        assert_eq!(result.last_kind, Some(FailureKind::Timeout));
        assert!(result.reason.contains("timed out"));
        assert!(result.to_string().starts_with("orchestration failed after 2 attempt(s)"));
    }

    #[test]
    fn exhausted_orchestration_maps_to_service_unavailable() {
        let interface = ApplicationError::from(ErrorResult::from_attempts(Vec::new()))
            .into_interface("req-1");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-1");
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("missing agent".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected error occurred");
    }
}
