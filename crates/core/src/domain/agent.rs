use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of responder agents a deployment can register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentId {
    #[serde(rename = "TriageAgent")]
    Triage,
    #[serde(rename = "HeadSupportAgent")]
    HeadSupport,
    #[serde(rename = "OrderStatusAgent")]
    OrderStatus,
    #[serde(rename = "OrderCancelAgent")]
    OrderCancel,
    #[serde(rename = "OrderRefundAgent")]
    OrderRefund,
    #[serde(rename = "TranslationAgent")]
    Translation,
}

impl AgentId {
    pub const ALL: [AgentId; 6] = [
        Self::Triage,
        Self::HeadSupport,
        Self::OrderStatus,
        Self::OrderCancel,
        Self::OrderRefund,
        Self::Translation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Triage => "TriageAgent",
            Self::HeadSupport => "HeadSupportAgent",
            Self::OrderStatus => "OrderStatusAgent",
            Self::OrderCancel => "OrderCancelAgent",
            Self::OrderRefund => "OrderRefundAgent",
            Self::Translation => "TranslationAgent",
        }
    }

    /// Exact, case-sensitive lookup by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }

    pub fn is_fulfillment(&self) -> bool {
        matches!(self, Self::OrderStatus | Self::OrderCancel | Self::OrderRefund)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown agent `{0}`")]
pub struct UnknownAgent(pub String);

impl FromStr for AgentId {
    type Err = UnknownAgent;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_name(value).ok_or_else(|| UnknownAgent(value.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    Agent(AgentId),
}

impl Author {
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            Self::User => None,
            Self::Agent(id) => Some(*id),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent(id) => id.name(),
        }
    }
}

impl From<AgentId> for Author {
    fn from(value: AgentId) -> Self {
        Self::Agent(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentId, Author, UnknownAgent};

    #[test]
    fn names_round_trip_exactly() {
        for id in AgentId::ALL {
            assert_eq!(AgentId::from_name(id.name()), Some(id));
        }
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert_eq!(AgentId::from_name("orderstatusagent"), None);
        assert_eq!(AgentId::from_name("OrderStatus"), None);
        assert!("TriageAgent ".parse::<AgentId>().is_err());
    }

    #[test]
    fn unknown_names_report_the_rejected_value() {
        let error = "BillingAgent".parse::<AgentId>().expect_err("not a registered agent name");
        assert_eq!(error, UnknownAgent("BillingAgent".to_string()));
        assert_eq!(error.to_string(), "unknown agent `BillingAgent`");

        let boxed: Box<dyn std::error::Error> = Box::new(error);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn only_order_agents_are_fulfillment() {
        let fulfillment: Vec<_> = AgentId::ALL.into_iter().filter(AgentId::is_fulfillment).collect();
        assert_eq!(
            fulfillment,
            vec![AgentId::OrderStatus, AgentId::OrderCancel, AgentId::OrderRefund]
        );
        assert_eq!(Author::from(AgentId::Triage).label(), "TriageAgent");
        assert!(Author::User.agent().is_none());
    }
}
