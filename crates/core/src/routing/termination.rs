use serde_json::Value;

use crate::config::RoutingConfig;
use crate::domain::agent::AgentId;
use crate::domain::message::Message;
use crate::domain::transcript::ConversationState;

pub trait TerminationStrategy: Send + Sync {
    fn should_terminate(&self, state: &ConversationState) -> bool;
}

/// Stop rule evaluated after every committed turn.
///
/// Without translation the last message's own flags decide. With translation the final pass
/// must always run, so only translation-authored turns may end the conversation: either by
/// carrying a set flag or once the current attempt outgrows `translation_turn_threshold`.
#[derive(Clone, Debug)]
pub struct TerminationPolicy {
    translation_enabled: bool,
    translation_turn_threshold: usize,
}

impl TerminationPolicy {
    pub fn new(config: &RoutingConfig, translation_enabled: bool) -> Self {
        Self { translation_enabled, translation_turn_threshold: config.translation_turn_threshold }
    }
}

impl TerminationStrategy for TerminationPolicy {
    fn should_terminate(&self, state: &ConversationState) -> bool {
        let Some(last) = state.last() else {
            return false;
        };

        if !self.translation_enabled {
            return carries_stop_flag(last);
        }

        if last.agent() != Some(AgentId::Translation) {
            return false;
        }

        state.attempt_len() > self.translation_turn_threshold || carries_stop_flag(last)
    }
}

fn carries_stop_flag(message: &Message) -> bool {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(message.content()) else {
        return false;
    };

    ["terminated", "need_more_info"]
        .into_iter()
        .any(|field| map.get(field).and_then(Value::as_str) == Some("True"))
}
