//! Pipeline and stage data model.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Whether a pipeline is available for new enrollments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Active,
    Inactive,
}

/// Who may enroll agents into a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    All,
    SelectedUsers,
}

/// One step in a pipeline.
///
/// Stage ids are stable across edits: renames and reorders keep the id, so
/// tasks referencing a stage never get silently re-pointed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub name: String,
    /// Dense 0..n-1 position within the parent pipeline.
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Task sets that must be assigned for this stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_task_sets: Vec<Uuid>,
}

/// A named, ordered sequence of stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: PipelineStatus,
    pub access_mode: AccessMode,
    /// Stages ordered by position.
    pub stages: Vec<Stage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pipeline {
    /// Look up the stage following `stage_id` in order, if any.
    pub fn next_stage_after(&self, stage_id: Uuid) -> Option<&Stage> {
        let current = self.stages.iter().find(|s| s.id == stage_id)?;
        self.stages
            .iter()
            .find(|s| s.position == current.position + 1)
    }
}

/// One stage as submitted by a pipeline save.
///
/// An entry with a known `id` keeps that stage's identity through renames
/// and reorders; an entry without one creates a new stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub required_task_sets: Vec<Uuid>,
}

/// Request body for creating or updating a pipeline.
///
/// Stages receive positions 0..n-1 in submission order; existing stages
/// absent from the submission are deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_status")]
    pub status: PipelineStatus,
    #[serde(default = "default_access_mode")]
    pub access_mode: AccessMode,
    #[serde(default)]
    pub stages: Vec<StageInput>,
}

fn default_status() -> PipelineStatus {
    PipelineStatus::Active
}

fn default_access_mode() -> AccessMode {
    AccessMode::All
}

impl PipelineInput {
    /// Validate required fields before touching the store.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Pipeline name must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "Stage name at position {i} must not be empty"
                )));
            }
            if let Some(id) = stage.id {
                if !seen.insert(id) {
                    return Err(Error::Validation(format!(
                        "Stage id {id} appears more than once"
                    )));
                }
            }
        }
        Ok(())
    }
}
