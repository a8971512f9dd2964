//! Onboarding enrollment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall onboarding status for an enrollment.
///
/// `Active` is terminal: the agent has finished the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    NotStarted,
    Invited,
    OnboardingStarted,
    CompliancePending,
    AwaitingApproval,
    Active,
}

impl OnboardingStatus {
    /// Whether onboarding is finished for this enrollment.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for OnboardingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Invited => "invited",
            Self::OnboardingStarted => "onboarding_started",
            Self::CompliancePending => "compliance_pending",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Active => "active",
        };
        write!(f, "{s}")
    }
}

/// An agent's enrollment in a pipeline.
///
/// `current_stage_id` advances monotonically through the pipeline's stage
/// order and becomes null once the terminal status is reached. `version`
/// increments on every advance so concurrent complete-stage calls can be
/// detected instead of last-write-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingRecord {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub pipeline_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_entered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_completed_at: Option<DateTime<Utc>>,
    pub status: OnboardingStatus,
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for enrolling an agent into a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollRequest {
    pub pipeline_id: Uuid,
}

/// Request body for the explicit complete-stage action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteStageRequest {
    #[serde(default)]
    pub approved_by: Option<String>,
    /// When false, only records completion of the current stage without
    /// advancing (the advance can be triggered later).
    #[serde(default = "default_move")]
    pub move_to_next_stage: bool,
    /// Optimistic concurrency token; mismatch with the stored record
    /// version is rejected with a conflict.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

fn default_move() -> bool {
    true
}
