//! One orchestration attempt: route, invoke, commit, check termination, then extract.

use std::sync::Arc;
use std::time::Instant;

use concierge_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use concierge_core::domain::agent::{AgentId, Author};
use concierge_core::domain::payload::{FinalAnswer, TaggedPayload};
use concierge_core::domain::transcript::ConversationState;
use concierge_core::errors::OrchestrationError;
use concierge_core::routing::{
    RoutingDecision, RoutingPolicy, RoutingStrategy, TerminationPolicy, TerminationStrategy,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::CapabilityError;
use crate::roster::AgentRoster;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

pub struct OrchestrationEngine<R = RoutingPolicy, T = TerminationPolicy> {
    roster: AgentRoster,
    routing: R,
    termination: T,
    max_iterations: u32,
    audit: Arc<dyn AuditSink>,
}

impl<R, T> OrchestrationEngine<R, T>
where
    R: RoutingStrategy,
    T: TerminationStrategy,
{
    pub fn new(roster: AgentRoster, routing: R, termination: T) -> Self {
        Self {
            roster,
            routing,
            termination,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            audit: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    pub async fn run(
        &self,
        state: &mut ConversationState,
        user_message: &str,
        cancel: &CancellationToken,
    ) -> Result<FinalAnswer, OrchestrationError> {
        let started = Instant::now();
        state.append(Author::User, user_message);

        let mut iterations = 0;
        loop {
            if iterations >= self.max_iterations {
                warn!(
                    event_name = "orchestration.iteration_cap_reached",
                    session_id = %state.session_id(),
                    attempt = state.attempt(),
                    max_iterations = self.max_iterations,
                    "iteration cap reached, extracting from last turn"
                );
                break;
            }
            iterations += 1;

            let agent = match self.route(state)? {
                RoutingDecision::Next(agent) => agent,
                decision @ (RoutingDecision::Halt | RoutingDecision::Terminate) => {
                    debug!(
                        event_name = "orchestration.routing_stopped",
                        session_id = %state.session_id(),
                        attempt = state.attempt(),
                        decision = ?decision,
                        "routing produced no further speaker"
                    );
                    self.audit.emit(
                        self.event(state, "orchestration.routing_stopped", AuditCategory::Routing)
                            .with_metadata("decision", format!("{decision:?}")),
                    );
                    break;
                }
            };

            info!(
                event_name = "orchestration.route_selected",
                session_id = %state.session_id(),
                attempt = state.attempt(),
                agent = agent.name(),
                turn = state.len(),
                "next agent selected"
            );
            self.audit.emit(
                self.event(state, "orchestration.route_selected", AuditCategory::Routing)
                    .with_metadata("agent", agent.name()),
            );

            let reply = match self.invoke(agent, state, cancel, started).await {
                Ok(reply) => reply,
                Err(error) => {
                    self.emit_failure(
                        state,
                        "orchestration.agent_failed",
                        AuditCategory::Capability,
                        &error,
                    );
                    return Err(error);
                }
            };
            state.append(agent.into(), reply);

            if self.termination.should_terminate(state) {
                // The stopping turn still has to pass the routing gates (confidence, parsing).
                self.route(state)?;
                info!(
                    event_name = "orchestration.terminated",
                    session_id = %state.session_id(),
                    attempt = state.attempt(),
                    agent = agent.name(),
                    turns = state.len(),
                    "termination condition met"
                );
                self.audit.emit(
                    self.event(state, "orchestration.terminated", AuditCategory::Termination)
                        .with_metadata("agent", agent.name()),
                );
                break;
            }
        }

        extract_answer(state)
    }

    async fn invoke(
        &self,
        agent: AgentId,
        state: &ConversationState,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<String, OrchestrationError> {
        let capability = self.roster.get(agent).ok_or_else(|| {
            OrchestrationError::no_route(format!("{agent} has no registered capability"))
        })?;

        let token = cancel.child_token();
        capability.invoke(state, &token).await.map_err(|error| match error {
            CapabilityError::Cancelled => OrchestrationError::Timeout { after: started.elapsed() },
            other => OrchestrationError::RunFailure { agent, detail: other.to_string() },
        })
    }

    fn route(&self, state: &ConversationState) -> Result<RoutingDecision, OrchestrationError> {
        self.routing.decide(state).map_err(|error| {
            self.emit_failure(state, "orchestration.route_failed", AuditCategory::Routing, &error);
            error
        })
    }

    fn event(
        &self,
        state: &ConversationState,
        event_type: &str,
        category: AuditCategory,
    ) -> AuditEvent {
        AuditEvent::new(
            state.session_id(),
            state.attempt(),
            event_type,
            category,
            "orchestration-engine",
            AuditOutcome::Success,
        )
    }

    fn emit_failure(
        &self,
        state: &ConversationState,
        event_type: &str,
        category: AuditCategory,
        error: &OrchestrationError,
    ) {
        let mut event = self.event(state, event_type, category);
        event.outcome = AuditOutcome::Failed;
        self.audit.emit(
            event
                .with_metadata("kind", error.kind().as_str())
                .with_metadata("error", error.to_string()),
        );
    }
}

/// Reads the user-facing answer off the last committed turn.
pub fn extract_answer(state: &ConversationState) -> Result<FinalAnswer, OrchestrationError> {
    let last = state
        .last()
        .ok_or_else(|| OrchestrationError::parse("transcript", "no messages to extract from"))?;
    let author = last.author().label();

    if last.author().is_user() {
        return Err(OrchestrationError::parse(author, "no agent replied to the user message"));
    }

    let payload = last.payload().map_err(|error| OrchestrationError::parse(author, error))?;

    match payload {
        TaggedPayload::CqaResult(result) => result
            .top_answer()
            .map(|answer| FinalAnswer::text(answer.answer.clone(), false))
            .ok_or_else(|| OrchestrationError::parse(author, "cqa_result carries no answers")),
        TaggedPayload::FinalAnswer(answer) => {
            Ok(FinalAnswer::text(answer.response_text(), answer.need_more_info.is_set()))
        }
        TaggedPayload::TranslationEnvelope(envelope) => {
            let text = envelope.final_answer.ok_or_else(|| {
                OrchestrationError::parse(author, "translation envelope has no final_answer")
            })?;
            Ok(FinalAnswer::text(text, latest_need_more_info(state)))
        }
        other => Err(OrchestrationError::parse(
            author,
            format!("{} cannot be presented as an answer", other.kind()),
        )),
    }
}

fn latest_need_more_info(state: &ConversationState) -> bool {
    state
        .attempt_messages()
        .iter()
        .rev()
        .find_map(|message| match message.payload() {
            Ok(TaggedPayload::FinalAnswer(answer)) => Some(answer.need_more_info.is_set()),
            _ => None,
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use concierge_core::audit::InMemoryAuditSink;
    use concierge_core::config::RoutingConfig;
    use concierge_core::domain::agent::{AgentId, Author};
    use concierge_core::domain::payload::{CqaResult, Flag, TaggedPayload};
    use concierge_core::domain::transcript::ConversationState;
    use concierge_core::errors::FailureKind;
    use concierge_core::routing::{
        RoutingDecision, RoutingPolicy, RoutingStrategy, TerminationPolicy, TerminationStrategy,
    };
    use concierge_core::OrchestrationError;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::{extract_answer, OrchestrationEngine};
    use crate::capability::{CapabilityError, FnCapability};
    use crate::roster::AgentRoster;

    struct AlwaysTriage;

    impl RoutingStrategy for AlwaysTriage {
        fn decide(&self, _state: &ConversationState) -> Result<RoutingDecision, OrchestrationError> {
            Ok(RoutingDecision::Next(AgentId::Triage))
        }
    }

    struct Never;

    impl TerminationStrategy for Never {
        fn should_terminate(&self, _state: &ConversationState) -> bool {
            false
        }
    }

    fn faq_engine(score: f64) -> OrchestrationEngine {
        let roster = AgentRoster::default().with(
            AgentId::Triage,
            FnCapability::new(move |_state: &ConversationState| {
                Ok(TaggedPayload::CqaResult(CqaResult::new("30-day returns.", score)).to_json())
            }),
        );
        let config = RoutingConfig::default();
        OrchestrationEngine::new(
            roster.clone(),
            RoutingPolicy::new(config.clone(), roster.ids()),
            TerminationPolicy::new(&config, false),
        )
    }

    #[tokio::test]
    async fn confident_faq_answer_is_extracted() {
        let sink = InMemoryAuditSink::default();
        let engine = faq_engine(0.9).with_audit(Arc::new(sink.clone()));
        let mut state = ConversationState::new();

        let answer = engine
            .run(&mut state, "query: What is the return policy", &CancellationToken::new())
            .await
            .expect("faq answer");

        assert_eq!(answer.response_text(), "30-day returns.");
        assert_eq!(answer.need_more_info, Flag::False);
        assert_eq!(state.len(), 2);
        assert_eq!(
            sink.event_types(),
            vec!["orchestration.route_selected", "orchestration.terminated"]
        );
    }

    #[tokio::test]
    async fn low_confidence_faq_answer_fails_the_attempt() {
        let sink = InMemoryAuditSink::default();
        let engine = faq_engine(0.1).with_audit(Arc::new(sink.clone()));
        let mut state = ConversationState::new();

        let error = engine
            .run(&mut state, "query: What is the return policy", &CancellationToken::new())
            .await
            .expect_err("low confidence");

        assert_eq!(error.kind(), FailureKind::LowConfidence);
        let failed = sink.events().into_iter().last().expect("failure event");
        assert_eq!(failed.event_type, "orchestration.route_failed");
        assert_eq!(failed.metadata.get("kind").map(String::as_str), Some("low_confidence"));
    }

    #[tokio::test]
    async fn iteration_cap_stops_the_loop_then_extracts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let roster = AgentRoster::default().with(
            AgentId::Triage,
            FnCapability::new(move |_state: &ConversationState| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"response": "still thinking", "terminated": "False"}).to_string())
            }),
        );
        let engine = OrchestrationEngine::new(roster, AlwaysTriage, Never).with_max_iterations(4);
        let mut state = ConversationState::new();

        let answer =
            engine.run(&mut state, "query: hi", &CancellationToken::new()).await.expect("answer");

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(state.len(), 5);
        assert_eq!(answer.response_text(), "still thinking");
    }

    #[tokio::test]
    async fn capability_failure_is_a_run_failure() {
        let roster = AgentRoster::default().with(
            AgentId::Triage,
            FnCapability::new(|_state: &ConversationState| {
                Err(CapabilityError::NotCompleted("failed".to_string()))
            }),
        );
        let engine = OrchestrationEngine::new(roster, AlwaysTriage, Never);

        let error = engine
            .run(&mut ConversationState::new(), "query: hi", &CancellationToken::new())
            .await
            .expect_err("run failure");

        assert!(matches!(error, OrchestrationError::RunFailure { agent: AgentId::Triage, .. }));
    }

    #[tokio::test]
    async fn cancelled_attempt_surfaces_as_timeout() {
        let roster = AgentRoster::default()
            .with(AgentId::Triage, FnCapability::new(|_state: &ConversationState| Ok("{}".into())));
        let engine = OrchestrationEngine::new(roster, AlwaysTriage, Never);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error =
            engine.run(&mut ConversationState::new(), "query: hi", &cancel).await.expect_err("cancelled");

        assert_eq!(error.kind(), FailureKind::Timeout);
    }

    #[test]
    fn extraction_requires_a_presentable_payload() {
        let mut state = ConversationState::new();
        state.append(Author::User, "query: hi");
        assert_eq!(extract_answer(&state).map_err(|e| e.kind()), Err(FailureKind::ParseError));

        state.append(AgentId::OrderStatus.into(), "Order shipped");
        assert_eq!(extract_answer(&state).map_err(|e| e.kind()), Err(FailureKind::ParseError));

        state.append(
            AgentId::HeadSupport.into(),
            json!({"target_agent": "OrderStatusAgent", "entities": []}).to_string(),
        );
        assert_eq!(extract_answer(&state).map_err(|e| e.kind()), Err(FailureKind::ParseError));
    }

    #[test]
    fn structured_final_answer_is_serialized() {
        let mut state = ConversationState::new();
        state.append(Author::User, "query: status");
        state.append(
            AgentId::OrderStatus.into(),
            json!({"response": {"order": "1", "state": "shipped"}, "terminated": "True", "need_more_info": "False"})
                .to_string(),
        );

        let answer = extract_answer(&state).expect("answer");
        assert_eq!(answer.response_text(), r#"{"order":"1","state":"shipped"}"#);
    }

    #[test]
    fn translated_answer_inherits_need_more_info() {
        let mut state = ConversationState::new();
        state.append(Author::User, "query: quiero cancelar mi pedido");
        state.append(
            AgentId::OrderCancel.into(),
            json!({"response": "Please provide more information", "terminated": "True", "need_more_info": "True"})
                .to_string(),
        );
        state.append(
            AgentId::Translation.into(),
            json!({"origin_language": "es", "final_answer": "Por favor, proporcione más información"})
                .to_string(),
        );

        let answer = extract_answer(&state).expect("translated answer");
        assert_eq!(answer.response_text(), "Por favor, proporcione más información");
        assert_eq!(answer.need_more_info, Flag::True);

        let mut faq = ConversationState::new();
        faq.append(Author::User, "query: política de devoluciones");
        faq.append(
            AgentId::Translation.into(),
            json!({"origin_language": "es", "final_answer": "30 días"}).to_string(),
        );
        assert_eq!(extract_answer(&faq).map(|a| a.need_more_info), Ok(Flag::False));
    }
}
