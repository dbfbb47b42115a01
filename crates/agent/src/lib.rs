//! Agent runtime: the orchestration loop that drives a user utterance through the responder
//! agents until an answer is produced.
//!
//! - `capability` / `roster` - the agents a deployment can call (remote HTTP or local)
//! - `engine` - one attempt: route, invoke, commit, check termination, extract
//! - `retry` - bounded attempts with per-attempt timeout and cancellation
//! - `runtime` - chat entry point with fallback once retries are exhausted
//!
//! Routing and termination decisions only read tagged payload fields and turn authors;
//! free text is never interpreted here.

pub mod audit;
pub mod capability;
pub mod engine;
pub mod fallback;
pub mod fulfillment;
pub mod remote;
pub mod retry;
pub mod roster;
pub mod runtime;

pub use capability::{AgentCapability, CapabilityError, FnCapability};
pub use engine::OrchestrationEngine;
pub use fallback::{FallbackResponder, StaticFallback};
pub use retry::{RetryController, RetryPolicy};
pub use roster::{AgentDescriptor, AgentRoster};
pub use runtime::{AgentRuntime, ChatReply, ChatTurn};
