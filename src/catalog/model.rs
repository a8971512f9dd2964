//! Task template and task set data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Task priority, shared between templates and instantiated tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// A reusable task definition.
///
/// Instantiated tasks copy the relevant fields at creation time, so editing
/// a template never mutates tasks already handed to agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub priority: Priority,
    /// Days after assignment before the instantiated task is due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_due_days: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating or updating a task template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub default_due_days: Option<u32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl TemplateInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Template name must not be empty".into()));
        }
        if self.category.trim().is_empty() {
            return Err(Error::Validation(
                "Template category must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// A named bundle of task templates, assignable to an agent as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSet {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    /// Template ids in assignment order.
    pub template_ids: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating or updating a task set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSetInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub template_ids: Vec<Uuid>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl TaskSetInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Task set name must not be empty".into()));
        }
        if self.template_ids.is_empty() {
            return Err(Error::Validation(
                "Task set must reference at least one template".into(),
            ));
        }
        Ok(())
    }
}
