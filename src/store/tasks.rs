//! Task storage and the task assignment engine.
//!
//! Assigning a task set is all-or-nothing: every task in the set is created
//! in one transaction, so a failure partway never leaves an agent with half
//! a set.

use chrono::Utc;
use libsql::params;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::tasks::model::{StageRef, Task, TaskInput, TaskStatus};

use super::catalog::{priority_to_str, str_to_priority};
use super::db::{
    Store, parse_datetime, parse_optional_datetime, parse_optional_uuid, parse_uuid,
};

fn status_to_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Completed => "completed",
        TaskStatus::Cancelled => "cancelled",
    }
}

fn str_to_status(s: &str) -> TaskStatus {
    match s {
        "in_progress" => TaskStatus::InProgress,
        "completed" => TaskStatus::Completed,
        "cancelled" => TaskStatus::Cancelled,
        _ => TaskStatus::Pending,
    }
}

/// Columns selected for task reads. The LEFT JOIN brings in the stage name
/// so a dangling stage id can be reported as orphaned.
const TASK_SELECT: &str = "SELECT t.id, t.agent_id, t.stage_id, t.task_set_id, t.template_id, \
     t.title, t.description, t.category, t.priority, t.status, t.is_completed, \
     t.due_date, t.completed_at, t.created_at, t.updated_at, s.name \
     FROM tasks t LEFT JOIN stages s ON s.id = t.stage_id";

fn row_to_task(row: &libsql::Row) -> Result<Task> {
    let id: String = row.get(0)?;
    let agent_id: String = row.get(1)?;
    let stage_id: Option<String> = row.get(2).ok();
    let task_set_id: Option<String> = row.get(3).ok();
    let template_id: Option<String> = row.get(4).ok();
    let priority: String = row.get(8)?;
    let status: String = row.get(9)?;
    let is_completed: i64 = row.get(10)?;
    let due_date: Option<String> = row.get(11).ok();
    let completed_at: Option<String> = row.get(12).ok();
    let created: String = row.get(13)?;
    let updated: String = row.get(14)?;
    let stage_name: Option<String> = row.get(15).ok();

    let stage = parse_optional_uuid(&stage_id).map(|sid| match stage_name {
        Some(name) => StageRef::Resolved { id: sid, name },
        None => StageRef::Orphaned { id: sid },
    });

    Ok(Task {
        id: parse_uuid(&id),
        agent_id: parse_uuid(&agent_id),
        title: row.get(5)?,
        description: row.get(6)?,
        category: row.get(7)?,
        priority: str_to_priority(&priority),
        status: str_to_status(&status),
        is_completed: is_completed != 0,
        due_date: parse_optional_datetime(&due_date),
        completed_at: parse_optional_datetime(&completed_at),
        stage,
        task_set_id: parse_optional_uuid(&task_set_id),
        template_id: parse_optional_uuid(&template_id),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

async fn insert_task(conn: &libsql::Connection, task: &Task) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks (id, agent_id, stage_id, task_set_id, template_id, title, \
         description, category, priority, status, is_completed, due_date, completed_at, \
         created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            task.id.to_string(),
            task.agent_id.to_string(),
            task.stage.as_ref().map(|s| s.id().to_string()),
            task.task_set_id.map(|v| v.to_string()),
            task.template_id.map(|v| v.to_string()),
            task.title.clone(),
            task.description.clone(),
            task.category.clone(),
            priority_to_str(task.priority),
            status_to_str(task.status),
            task.is_completed as i64,
            task.due_date.map(|d| d.to_rfc3339()),
            task.completed_at.map(|d| d.to_rfc3339()),
            task.created_at.to_rfc3339(),
            task.updated_at.to_rfc3339(),
        ],
    )
    .await?;
    Ok(())
}

impl Store {
    /// Create a one-off task for an agent.
    pub async fn create_task(&self, input: &TaskInput) -> Result<Task> {
        input.validate()?;
        self.get_agent(input.agent_id).await?;

        let stage = match input.stage_id {
            Some(stage_id) => Some(self.resolve_stage_ref(stage_id).await?),
            None => None,
        };

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            agent_id: input.agent_id,
            title: input.title.clone(),
            description: input.description.clone(),
            category: input.category.clone(),
            priority: input.priority,
            status: TaskStatus::Pending,
            is_completed: false,
            due_date: input.due_date,
            completed_at: None,
            stage,
            task_set_id: None,
            template_id: None,
            created_at: now,
            updated_at: now,
        };
        insert_task(self.conn(), &task).await?;
        debug!(task_id = %task.id, agent_id = %task.agent_id, "Task created");
        self.get_task(task.id).await
    }

    /// A stage reference used at creation time must resolve.
    async fn resolve_stage_ref(&self, stage_id: Uuid) -> Result<StageRef> {
        let mut rows = self
            .conn()
            .query(
                "SELECT name FROM stages WHERE id = ?1",
                params![stage_id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(StageRef::Resolved {
                id: stage_id,
                name: row.get(0)?,
            }),
            None => Err(Error::not_found("Stage", stage_id)),
        }
    }

    /// Get a task by id.
    pub async fn get_task(&self, id: Uuid) -> Result<Task> {
        let mut rows = self
            .conn()
            .query(
                &format!("{TASK_SELECT} WHERE t.id = ?1"),
                params![id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_task(&row),
            None => Err(Error::not_found("Task", id)),
        }
    }

    /// List an agent's tasks, newest first.
    pub async fn list_agent_tasks(&self, agent_id: Uuid) -> Result<Vec<Task>> {
        self.get_agent(agent_id).await?;
        let mut rows = self
            .conn()
            .query(
                &format!("{TASK_SELECT} WHERE t.agent_id = ?1 ORDER BY t.created_at DESC, t.id"),
                params![agent_id.to_string()],
            )
            .await?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    /// Toggle a task's completion state.
    pub async fn set_task_completed(&self, id: Uuid, completed: bool) -> Result<Task> {
        let mut task = self.get_task(id).await?;
        task.set_completed(completed, Utc::now());
        self.conn()
            .execute(
                "UPDATE tasks SET status = ?1, is_completed = ?2, completed_at = ?3, \
                 updated_at = ?4 WHERE id = ?5",
                params![
                    status_to_str(task.status),
                    task.is_completed as i64,
                    task.completed_at.map(|d| d.to_rfc3339()),
                    task.updated_at.to_rfc3339(),
                    id.to_string(),
                ],
            )
            .await?;
        debug!(task_id = %id, completed, "Task completion toggled");
        Ok(task)
    }

    /// Assign a task set to an agent, instantiating one task per template.
    ///
    /// Atomic: either every template in the set becomes a task or none do.
    pub async fn assign_task_set(
        &self,
        set_id: Uuid,
        agent_id: Uuid,
        stage_id: Option<Uuid>,
    ) -> Result<Vec<Task>> {
        self.get_agent(agent_id).await?;
        let set = self.get_task_set(set_id).await?;
        if !set.is_active {
            return Err(Error::Validation(format!(
                "Task set is inactive: {}",
                set.name
            )));
        }
        let stage = match stage_id {
            Some(id) => Some(self.resolve_stage_ref(id).await?),
            None => None,
        };

        let mut templates = Vec::with_capacity(set.template_ids.len());
        for template_id in &set.template_ids {
            templates.push(self.get_template(*template_id).await?);
        }

        let assigned_at = Utc::now();
        let tasks: Vec<Task> = templates
            .iter()
            .map(|tpl| {
                Task::from_template(tpl, agent_id, stage.clone(), Some(set_id), assigned_at)
            })
            .collect();

        self.with_write_slot(async {
            let tx = self.conn().transaction().await?;
            for task in &tasks {
                insert_task(&tx, task).await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await?;

        info!(
            task_set_id = %set_id,
            agent_id = %agent_id,
            count = tasks.len(),
            "Task set assigned"
        );
        Ok(tasks)
    }

    /// Total and completed task counts for an agent within one stage.
    pub(crate) async fn stage_task_counts(
        &self,
        agent_id: Uuid,
        stage_id: Uuid,
    ) -> Result<(u64, u64)> {
        let total = self
            .count(
                "SELECT COUNT(*) FROM tasks WHERE agent_id = ?1 AND stage_id = ?2 \
                 AND status != 'cancelled'",
                params![agent_id.to_string(), stage_id.to_string()],
            )
            .await?;
        let completed = self
            .count(
                "SELECT COUNT(*) FROM tasks WHERE agent_id = ?1 AND stage_id = ?2 \
                 AND status != 'cancelled' AND is_completed = 1",
                params![agent_id.to_string(), stage_id.to_string()],
            )
            .await?;
        Ok((total, completed))
    }
}
