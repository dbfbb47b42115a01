pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod routing;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions, RoutingConfig};
pub use domain::agent::{AgentId, Author};
pub use domain::message::Message;
pub use domain::payload::{FinalAnswer, TaggedPayload};
pub use domain::transcript::ConversationState;
pub use errors::{
    ApplicationError, ErrorResult, FailureKind, InterfaceError, OrchestrationError, RetryAttempt,
};
pub use routing::{
    RoutingDecision, RoutingPolicy, RoutingStrategy, TerminationPolicy, TerminationStrategy,
};
