//! Stage completion state machine — tracks where an agent stands within
//! the current pipeline stage.

use serde::{Deserialize, Serialize};

/// Phases of a single stage for an enrolled agent.
///
/// Progresses linearly: NotEntered → InProgress → Complete → Advanced.
/// `Complete → Advanced` is the explicit complete-stage action; it never
/// happens automatically when the last task is checked off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePhase {
    NotEntered,
    InProgress,
    Complete,
    Advanced,
}

impl StagePhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: StagePhase) -> bool {
        use StagePhase::*;
        matches!(
            (self, target),
            (NotEntered, InProgress) | (InProgress, Complete) | (Complete, Advanced)
        )
    }

    /// Derive the phase for an agent's current stage from task counts.
    ///
    /// A stage with zero scoped tasks counts as complete: there is nothing
    /// left to do before the explicit advance.
    pub fn from_progress(entered: bool, remaining_tasks: u64) -> StagePhase {
        if !entered {
            StagePhase::NotEntered
        } else if remaining_tasks == 0 {
            StagePhase::Complete
        } else {
            StagePhase::InProgress
        }
    }
}

impl std::fmt::Display for StagePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotEntered => "not_entered",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Advanced => "advanced",
        };
        write!(f, "{s}")
    }
}
