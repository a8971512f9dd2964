//! Persistence layer — libSQL-backed storage, one file per entity.

pub mod agents;
pub mod catalog;
pub mod db;
pub mod migrations;
pub mod onboarding;
pub mod pipelines;
pub mod roles;
pub mod tasks;

pub use db::Store;
