//! Read-only progress aggregation over enrollment and task state.
//!
//! Pure computation: the store fetches the raw counts, these types shape
//! them for the API. No side effects anywhere in this module.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::OnboardingStatus;
use super::state::StagePhase;

/// Task counts for an agent's current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub remaining_tasks: u64,
    /// True when every task scoped to the stage is completed.
    pub stage_complete: bool,
}

impl StageProgress {
    /// Compute progress from raw counts.
    pub fn compute(total: u64, completed: u64) -> Self {
        let completed = completed.min(total);
        Self {
            total_tasks: total,
            completed_tasks: completed,
            remaining_tasks: total - completed,
            stage_complete: completed == total,
        }
    }

    /// Completion percentage, 0-100. An empty stage reads as 100.
    pub fn percent_complete(&self) -> u32 {
        if self.total_tasks == 0 {
            100
        } else {
            ((self.completed_tasks * 100) / self.total_tasks) as u32
        }
    }
}

/// Snapshot of the stage an agent currently occupies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub id: Uuid,
    pub name: String,
    /// Position index within the pipeline's ordered stages.
    pub index: u32,
}

/// Aggregate onboarding view for one agent.
///
/// An agent with no pipeline enrollment gets the `NotEnrolled` variant, not
/// an error: callers render a degraded tasks-only UI in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "enrollment", rename_all = "snake_case")]
pub enum OnboardingSummary {
    NotEnrolled {
        agent_id: Uuid,
    },
    Enrolled {
        agent_id: Uuid,
        pipeline_id: Uuid,
        pipeline_name: String,
        status: OnboardingStatus,
        version: i64,
        /// Null once the terminal status is reached.
        #[serde(skip_serializing_if = "Option::is_none")]
        current_stage: Option<StageSnapshot>,
        total_stages: u32,
        phase: StagePhase,
        progress: StageProgress,
        /// Completion percentage for the current stage, 0-100.
        percent_complete: u32,
    },
}

/// Dashboard counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OnboardingStats {
    /// Agents created today.
    pub new_hires_today: u64,
    /// Agents created this calendar month.
    pub new_hires_this_month: u64,
    /// Enrollments still in a non-terminal status.
    pub pending_actions: u64,
    /// Enrollments with at least one incomplete task past its due date.
    pub past_due: u64,
}
