pub mod policy;
pub mod termination;

pub use policy::{RoutingDecision, RoutingPolicy, RoutingStrategy};
pub use termination::{TerminationPolicy, TerminationStrategy};
