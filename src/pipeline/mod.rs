//! Pipeline definitions — named, ordered sequences of onboarding stages.

pub mod model;

pub use model::{AccessMode, Pipeline, PipelineInput, PipelineStatus, Stage, StageInput};
