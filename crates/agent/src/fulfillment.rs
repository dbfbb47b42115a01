use async_trait::async_trait;
use concierge_core::domain::agent::AgentId;
use concierge_core::domain::payload::{find_order_id, FinalAnswer, TaggedPayload};
use concierge_core::domain::transcript::ConversationState;
use tokio_util::sync::CancellationToken;

use crate::capability::{AgentCapability, CapabilityError};

pub const MISSING_ORDER_ID: &str =
    "Please provide more information about your order so I can better assist you.";

pub fn order_status(order_id: &str) -> String {
    format!("Order {order_id} is shipped and will arrive in 2-3 days.")
}

pub fn order_cancel(order_id: &str) -> String {
    format!("Cancellation for order {order_id} has been processed successfully.")
}

pub fn order_refund(order_id: &str) -> String {
    format!("Refund for order {order_id} has been processed successfully.")
}

/// Local order action driven by the entities of the latest head-support route decision.
#[derive(Clone, Copy)]
pub struct FulfillmentAgent {
    id: AgentId,
    action: fn(&str) -> String,
}

impl FulfillmentAgent {
    pub fn order_status() -> Self {
        Self { id: AgentId::OrderStatus, action: order_status }
    }

    pub fn order_cancel() -> Self {
        Self { id: AgentId::OrderCancel, action: order_cancel }
    }

    pub fn order_refund() -> Self {
        Self { id: AgentId::OrderRefund, action: order_refund }
    }

    pub fn all() -> [Self; 3] {
        [Self::order_status(), Self::order_cancel(), Self::order_refund()]
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn respond(&self, state: &ConversationState) -> FinalAnswer {
        match routed_order_id(state) {
            Some(order_id) => FinalAnswer::text((self.action)(&order_id), false),
            None => FinalAnswer::text(MISSING_ORDER_ID, true),
        }
    }
}

fn routed_order_id(state: &ConversationState) -> Option<String> {
    let decision = state
        .messages()
        .iter()
        .rev()
        .filter(|message| message.agent() == Some(AgentId::HeadSupport))
        .find_map(|message| match message.payload() {
            Ok(TaggedPayload::RouteDecision(decision)) => Some(decision),
            _ => None,
        })?;

    find_order_id(&decision.entities).map(str::to_string)
}

#[async_trait]
impl AgentCapability for FulfillmentAgent {
    async fn invoke(
        &self,
        state: &ConversationState,
        cancel: &CancellationToken,
    ) -> Result<String, CapabilityError> {
        if cancel.is_cancelled() {
            return Err(CapabilityError::Cancelled);
        }
        Ok(TaggedPayload::FinalAnswer(self.respond(state)).to_json())
    }
}
