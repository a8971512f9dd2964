//! Agent records — brokerage agents, owned independently of onboarding.

pub mod model;

pub use model::{Agent, AgentInput, AgentStatus, AgentUpdate};
