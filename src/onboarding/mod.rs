//! Agent onboarding — enrollment records, stage progression, and progress
//! aggregation.

pub mod aggregator;
pub mod model;
pub mod state;

pub use aggregator::{OnboardingStats, OnboardingSummary, StageProgress, StageSnapshot};
pub use model::{CompleteStageRequest, EnrollRequest, OnboardingRecord, OnboardingStatus};
pub use state::StagePhase;
