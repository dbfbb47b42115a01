use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use concierge_core::config::AppConfig;
use concierge_core::domain::agent::AgentId;

use crate::capability::{AgentCapability, CapabilityError};
use crate::fulfillment::FulfillmentAgent;
use crate::remote::RemoteCapability;

#[derive(Clone)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub capability: Arc<dyn AgentCapability>,
}

/// Fixed set of agents available to one deployment.
#[derive(Clone, Default)]
pub struct AgentRoster {
    agents: BTreeMap<AgentId, Arc<dyn AgentCapability>>,
}

impl AgentRoster {
    pub fn register<C>(&mut self, id: AgentId, capability: C)
    where
        C: AgentCapability + 'static,
    {
        self.agents.insert(id, Arc::new(capability));
    }

    pub fn with<C>(mut self, id: AgentId, capability: C) -> Self
    where
        C: AgentCapability + 'static,
    {
        self.register(id, capability);
        self
    }

    /// Registers the three local order fulfillment agents.
    pub fn with_fulfillment(mut self) -> Self {
        for agent in FulfillmentAgent::all() {
            self.register(agent.id(), agent);
        }
        self
    }

    pub fn get(&self, id: AgentId) -> Option<Arc<dyn AgentCapability>> {
        self.agents.get(&id).cloned()
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.agents
            .iter()
            .map(|(id, capability)| AgentDescriptor { id: *id, capability: capability.clone() })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Remote triage, head support and (optional) translation endpoints plus local fulfillment.
    pub fn from_config(config: &AppConfig) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.agents.request_timeout_secs))
            .build()
            .map_err(|error| CapabilityError::Transport(error.to_string()))?;

        let endpoints = [
            (AgentId::Triage, config.agents.triage_url.as_ref()),
            (AgentId::HeadSupport, config.agents.head_support_url.as_ref()),
            (AgentId::Translation, config.agents.translation_url.as_ref()),
        ];

        let mut roster = Self::default().with_fulfillment();
        for (id, endpoint) in endpoints {
            if let Some(endpoint) = endpoint {
                roster.register(
                    id,
                    RemoteCapability::new(
                        id,
                        endpoint.clone(),
                        client.clone(),
                        config.agents.api_key.clone(),
                    ),
                );
            }
        }

        Ok(roster)
    }
}
