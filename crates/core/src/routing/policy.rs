//! Next-speaker selection.
//!
//! The policy is keyed on the author of the last committed message and reads only tagged
//! payload fields. It never mutates the transcript, so deciding twice on the same transcript
//! yields the same outcome.

use std::collections::BTreeSet;

use crate::config::RoutingConfig;
use crate::domain::agent::AgentId;
use crate::domain::message::Message;
use crate::domain::payload::{CluResult, CqaResult, PayloadError, TaggedPayload};
use crate::domain::transcript::ConversationState;
use crate::errors::OrchestrationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingDecision {
    Next(AgentId),
    /// Nothing further to route; the engine defers to termination and extraction.
    Halt,
    Terminate,
}

pub trait RoutingStrategy: Send + Sync {
    fn decide(&self, state: &ConversationState) -> Result<RoutingDecision, OrchestrationError>;
}

#[derive(Clone, Debug)]
pub struct RoutingPolicy {
    config: RoutingConfig,
    registered: BTreeSet<AgentId>,
}

impl RoutingPolicy {
    pub fn new(config: RoutingConfig, registered: impl IntoIterator<Item = AgentId>) -> Self {
        Self { config, registered: registered.into_iter().collect() }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn is_registered(&self, agent: AgentId) -> bool {
        self.registered.contains(&agent)
    }

    fn translation_enabled(&self) -> bool {
        self.is_registered(AgentId::Translation)
    }

    fn next(&self, agent: AgentId) -> Result<RoutingDecision, OrchestrationError> {
        if self.is_registered(agent) {
            Ok(RoutingDecision::Next(agent))
        } else {
            Err(OrchestrationError::no_route(format!("{agent} is not registered")))
        }
    }

    fn after_user(&self) -> Result<RoutingDecision, OrchestrationError> {
        if self.translation_enabled() {
            Ok(RoutingDecision::Next(AgentId::Translation))
        } else if self.is_registered(AgentId::Triage) {
            Ok(RoutingDecision::Next(AgentId::Triage))
        } else {
            Err(OrchestrationError::no_route("neither TranslationAgent nor TriageAgent is registered"))
        }
    }

    fn after_translation(&self, message: &Message) -> Result<RoutingDecision, OrchestrationError> {
        match message.payload() {
            Ok(TaggedPayload::TranslationEnvelope(_)) => self.next(AgentId::Triage),
            Ok(other) => Err(OrchestrationError::no_route(format!(
                "TranslationAgent replied with {} instead of a translation envelope",
                other.kind()
            ))),
            Err(error) => Err(OrchestrationError::no_route(format!(
                "TranslationAgent reply is not a translation envelope: {error}"
            ))),
        }
    }

    fn after_triage(&self, message: &Message) -> Result<RoutingDecision, OrchestrationError> {
        let payload = match message.payload() {
            Ok(payload) => payload,
            Err(error) if error.is_malformed() => {
                return Err(OrchestrationError::parse(AgentId::Triage.name(), error));
            }
            Err(error) => return Err(unroutable_triage(&error)),
        };

        match payload {
            TaggedPayload::CqaResult(result) => self.route_cqa(&result),
            TaggedPayload::CluResult(result) => self.route_clu(&result),
            other => Err(OrchestrationError::no_route(format!(
                "TriageAgent replied with unroutable payload {}",
                other.kind()
            ))),
        }
    }

    fn route_cqa(&self, result: &CqaResult) -> Result<RoutingDecision, OrchestrationError> {
        let answer = result
            .top_answer()
            .ok_or_else(|| OrchestrationError::no_route("cqa_result carries no answers"))?;
        let threshold = self.config.cqa_confidence_threshold;

        if answer.confidence_score < threshold {
            return Err(OrchestrationError::LowConfidence {
                kind: "cqa",
                score: answer.confidence_score,
                threshold,
            });
        }

        if self.translation_enabled() {
            Ok(RoutingDecision::Next(AgentId::Translation))
        } else {
            Ok(RoutingDecision::Terminate)
        }
    }

    fn route_clu(&self, result: &CluResult) -> Result<RoutingDecision, OrchestrationError> {
        if let Some(threshold) = self.config.clu_confidence_threshold {
            let intent = result
                .top_intent()
                .ok_or_else(|| OrchestrationError::no_route("clu_result carries no intents"))?;
            if intent.confidence_score < threshold {
                return Err(OrchestrationError::LowConfidence {
                    kind: "clu",
                    score: intent.confidence_score,
                    threshold,
                });
            }
        }

        self.next(AgentId::HeadSupport)
    }

    fn after_head_support(&self, message: &Message) -> Result<RoutingDecision, OrchestrationError> {
        let decision = match message.payload() {
            Ok(TaggedPayload::RouteDecision(decision)) => decision,
            Ok(other) => {
                return Err(OrchestrationError::no_route(format!(
                    "HeadSupportAgent replied with {} instead of a route decision",
                    other.kind()
                )));
            }
            Err(error) if error.is_malformed() => {
                return Err(OrchestrationError::parse(AgentId::HeadSupport.name(), error));
            }
            Err(error) => {
                return Err(OrchestrationError::no_route(format!(
                    "HeadSupportAgent reply carries no route decision: {error}"
                )));
            }
        };

        let target = decision
            .target_agent
            .as_deref()
            .ok_or_else(|| OrchestrationError::no_route("route decision has no target_agent"))?;

        match AgentId::from_name(target) {
            Some(agent) if self.is_registered(agent) => Ok(RoutingDecision::Next(agent)),
            _ => Err(OrchestrationError::no_route(format!(
                "target_agent `{target}` matches no registered agent"
            ))),
        }
    }

    fn after_fulfillment(&self) -> RoutingDecision {
        if self.translation_enabled() {
            RoutingDecision::Next(AgentId::Translation)
        } else {
            RoutingDecision::Halt
        }
    }
}

impl RoutingStrategy for RoutingPolicy {
    fn decide(&self, state: &ConversationState) -> Result<RoutingDecision, OrchestrationError> {
        let Some(last) = state.last() else {
            return self.after_user();
        };

        match last.agent() {
            None => self.after_user(),
            Some(AgentId::Translation) => self.after_translation(last),
            Some(AgentId::Triage) => self.after_triage(last),
            Some(AgentId::HeadSupport) => self.after_head_support(last),
            Some(AgentId::OrderStatus | AgentId::OrderCancel | AgentId::OrderRefund) => {
                Ok(self.after_fulfillment())
            }
        }
    }
}

fn unroutable_triage(error: &PayloadError) -> OrchestrationError {
    OrchestrationError::no_route(format!("TriageAgent reply is not routable: {error}"))
}
