//! Brokerage CRM — onboarding pipelines, task catalog, roles, and agents.

pub mod agents;
pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod onboarding;
pub mod pipeline;
pub mod roles;
pub mod store;
pub mod tasks;
