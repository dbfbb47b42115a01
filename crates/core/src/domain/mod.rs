pub mod agent;
pub mod message;
pub mod payload;
pub mod transcript;

pub use agent::{AgentId, Author, UnknownAgent};
pub use message::Message;
pub use payload::{
    find_order_id, CluResult, CqaAnswer, CqaResult, Entity, FinalAnswer, Flag, Intent,
    PayloadError, RouteDecision, TaggedPayload, TranslationEnvelope,
};
pub use transcript::ConversationState;
