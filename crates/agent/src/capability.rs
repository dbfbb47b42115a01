use async_trait::async_trait;
use concierge_core::domain::transcript::ConversationState;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A responder agent: given the full transcript, produce the content of its next turn.
///
/// Implementations must return promptly with [`CapabilityError::Cancelled`] once `cancel` fires.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    async fn invoke(
        &self,
        state: &ConversationState,
        cancel: &CancellationToken,
    ) -> Result<String, CapabilityError>;
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("agent request failed: {0}")]
    Transport(String),
    #[error("agent endpoint returned HTTP {0}")]
    HttpStatus(u16),
    #[error("agent run ended with status `{0}`")]
    NotCompleted(String),
    #[error("agent response could not be decoded: {0}")]
    Decode(String),
    #[error("agent invocation was cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

/// Capability backed by a synchronous closure over the transcript.
pub struct FnCapability<F> {
    respond: F,
}

impl<F> FnCapability<F>
where
    F: Fn(&ConversationState) -> Result<String, CapabilityError> + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self { respond }
    }
}

#[async_trait]
impl<F> AgentCapability for FnCapability<F>
where
    F: Fn(&ConversationState) -> Result<String, CapabilityError> + Send + Sync,
{
    async fn invoke(
        &self,
        state: &ConversationState,
        cancel: &CancellationToken,
    ) -> Result<String, CapabilityError> {
        if cancel.is_cancelled() {
            return Err(CapabilityError::Cancelled);
        }
        (self.respond)(state)
    }
}
