//! Task data model — per-agent task instances and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::model::{Priority, TaskTemplate};
use crate::error::{Error, Result};

/// Task lifecycle status. Tasks are never hard-deleted while referenced by
/// progress aggregates; `Cancelled` is the soft removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

/// A task's link to a pipeline stage.
///
/// Deleting a stage leaves historical tasks pointing at an id that no
/// longer resolves; that is surfaced as `Orphaned` rather than a silently
/// failed join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageRef {
    Resolved { id: Uuid, name: String },
    Orphaned { id: Uuid },
}

impl StageRef {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Resolved { id, .. } | Self::Orphaned { id } => *id,
        }
    }
}

/// A concrete task owned by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Stage this task belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageRef>,
    /// Task set this task was instantiated from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_set_id: Option<Uuid>,
    /// Template this task was instantiated from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Instantiate a task from a template, copying the fields that must
    /// survive later template edits.
    pub fn from_template(
        template: &TaskTemplate,
        agent_id: Uuid,
        stage: Option<StageRef>,
        task_set_id: Option<Uuid>,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        let due_date = template
            .default_due_days
            .map(|days| assigned_at + chrono::Duration::days(i64::from(days)));
        Self {
            id: Uuid::new_v4(),
            agent_id,
            title: template.name.clone(),
            description: template.description.clone(),
            category: template.category.clone(),
            priority: template.priority,
            status: TaskStatus::Pending,
            is_completed: false,
            due_date,
            completed_at: None,
            stage,
            task_set_id,
            template_id: Some(template.id),
            created_at: assigned_at,
            updated_at: assigned_at,
        }
    }

    /// Flip completion state. Completing sets `completed_at`; un-completing
    /// clears it and returns the task to Pending.
    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        self.is_completed = completed;
        if completed {
            self.status = TaskStatus::Completed;
            self.completed_at = Some(now);
        } else {
            self.status = TaskStatus::Pending;
            self.completed_at = None;
        }
        self.updated_at = now;
    }
}

/// Request body for creating a one-off task (not via a task set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInput {
    pub agent_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stage_id: Option<Uuid>,
}

impl TaskInput {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("Task title must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(due_days: Option<u32>) -> TaskTemplate {
        TaskTemplate {
            id: Uuid::new_v4(),
            name: "Sign ICA".into(),
            description: "Independent contractor agreement".into(),
            category: "compliance".into(),
            priority: Priority::High,
            default_due_days: due_days,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn from_template_copies_fields() {
        let tpl = template(Some(7));
        let agent = Uuid::new_v4();
        let now = Utc::now();
        let task = Task::from_template(&tpl, agent, None, None, now);

        assert_eq!(task.title, "Sign ICA");
        assert_eq!(task.category, "compliance");
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(!task.is_completed);
        assert_eq!(task.due_date, Some(now + chrono::Duration::days(7)));
        assert_eq!(task.template_id, Some(tpl.id));
    }

    #[test]
    fn from_template_without_due_days() {
        let tpl = template(None);
        let task = Task::from_template(&tpl, Uuid::new_v4(), None, None, Utc::now());
        assert!(task.due_date.is_none());
    }

    #[test]
    fn toggle_completion() {
        let tpl = template(None);
        let mut task = Task::from_template(&tpl, Uuid::new_v4(), None, None, Utc::now());

        let now = Utc::now();
        task.set_completed(true, now);
        assert!(task.is_completed);
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completed_at, Some(now));

        task.set_completed(false, now);
        assert!(!task.is_completed);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn stage_ref_tagged_serde() {
        let resolved = StageRef::Resolved {
            id: Uuid::new_v4(),
            name: "Lead".into(),
        };
        let json = serde_json::to_string(&resolved).unwrap();
        assert!(json.contains("\"kind\":\"resolved\""));

        let orphaned = StageRef::Orphaned { id: Uuid::new_v4() };
        let json = serde_json::to_string(&orphaned).unwrap();
        assert!(json.contains("\"kind\":\"orphaned\""));
        assert!(!json.contains("name"));
    }

    #[test]
    fn task_input_validation() {
        let input = TaskInput {
            agent_id: Uuid::new_v4(),
            title: " ".into(),
            description: String::new(),
            category: "misc".into(),
            priority: Priority::Medium,
            due_date: None,
            stage_id: None,
        };
        assert!(input.validate().is_err());
    }
}
