//! Task template and task set storage.

use chrono::Utc;
use libsql::params;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::model::{Priority, TaskSet, TaskSetInput, TaskTemplate, TemplateInput};
use crate::error::{Error, Result};

use super::db::{Store, parse_datetime, parse_uuid};

pub(crate) fn priority_to_str(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Urgent => "urgent",
    }
}

pub(crate) fn str_to_priority(s: &str) -> Priority {
    match s {
        "low" => Priority::Low,
        "high" => Priority::High,
        "urgent" => Priority::Urgent,
        _ => Priority::Medium,
    }
}

fn row_to_template(row: &libsql::Row) -> Result<TaskTemplate> {
    let id: String = row.get(0)?;
    let priority: String = row.get(4)?;
    let due_days: Option<i64> = row.get(5).ok();
    let is_active: i64 = row.get(6)?;
    let created: String = row.get(7)?;
    let updated: String = row.get(8)?;
    Ok(TaskTemplate {
        id: parse_uuid(&id),
        name: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        priority: str_to_priority(&priority),
        default_due_days: due_days.and_then(|d| u32::try_from(d).ok()),
        is_active: is_active != 0,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const TEMPLATE_COLUMNS: &str =
    "id, name, description, category, priority, default_due_days, is_active, created_at, updated_at";

impl Store {
    /// Create a task template.
    pub async fn create_template(&self, input: &TemplateInput) -> Result<TaskTemplate> {
        input.validate()?;
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO task_templates (id, name, description, category, priority, \
                 default_due_days, is_active, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.to_string(),
                    input.name.clone(),
                    input.description.clone(),
                    input.category.clone(),
                    priority_to_str(input.priority),
                    input.default_due_days.map(i64::from),
                    input.is_active as i64,
                    now.clone(),
                    now,
                ],
            )
            .await?;
        debug!(template_id = %id, name = %input.name, "Task template created");
        self.get_template(id).await
    }

    /// Get a template by id.
    pub async fn get_template(&self, id: Uuid) -> Result<TaskTemplate> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TEMPLATE_COLUMNS} FROM task_templates WHERE id = ?1"),
                params![id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_template(&row),
            None => Err(Error::not_found("Task template", id)),
        }
    }

    /// List templates, optionally only active ones.
    pub async fn list_templates(&self, active_only: bool) -> Result<Vec<TaskTemplate>> {
        let sql = if active_only {
            format!("SELECT {TEMPLATE_COLUMNS} FROM task_templates WHERE is_active = 1 ORDER BY name")
        } else {
            format!("SELECT {TEMPLATE_COLUMNS} FROM task_templates ORDER BY name")
        };
        let mut rows = self.conn().query(&sql, ()).await?;
        let mut templates = Vec::new();
        while let Some(row) = rows.next().await? {
            templates.push(row_to_template(&row)?);
        }
        Ok(templates)
    }

    /// Update a template. Tasks already instantiated from it are untouched:
    /// they copied their fields at creation time.
    pub async fn update_template(&self, id: Uuid, input: &TemplateInput) -> Result<TaskTemplate> {
        input.validate()?;
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE task_templates SET name = ?1, description = ?2, category = ?3, \
                 priority = ?4, default_due_days = ?5, is_active = ?6, updated_at = ?7 \
                 WHERE id = ?8",
                params![
                    input.name.clone(),
                    input.description.clone(),
                    input.category.clone(),
                    priority_to_str(input.priority),
                    input.default_due_days.map(i64::from),
                    input.is_active as i64,
                    now,
                    id.to_string(),
                ],
            )
            .await?;
        if affected == 0 {
            return Err(Error::not_found("Task template", id));
        }
        self.get_template(id).await
    }

    /// Create a task set referencing ≥1 template.
    pub async fn create_task_set(&self, input: &TaskSetInput) -> Result<TaskSet> {
        input.validate()?;
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        self.with_write_slot(async {
            let tx = self.conn().transaction().await?;
            tx.execute(
                "INSERT INTO task_sets (id, name, description, category, is_active, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    input.name.clone(),
                    input.description.clone(),
                    input.category.clone(),
                    input.is_active as i64,
                    now.clone(),
                    now.clone(),
                ],
            )
            .await?;
            for (position, template_id) in input.template_ids.iter().enumerate() {
                let affected = tx
                    .execute(
                        "INSERT OR IGNORE INTO task_set_templates (task_set_id, template_id, position) \
                         SELECT ?1, id, ?2 FROM task_templates WHERE id = ?3",
                        params![id.to_string(), position as i64, template_id.to_string()],
                    )
                    .await?;
                if affected == 0 {
                    let exists = super::db::count_on(
                        &tx,
                        "SELECT COUNT(*) FROM task_templates WHERE id = ?1",
                        params![template_id.to_string()],
                    )
                    .await?;
                    if exists == 0 {
                        return Err(Error::Validation(format!(
                            "Unknown template id: {template_id}"
                        )));
                    }
                }
            }
            tx.commit().await?;
            Ok(())
        })
        .await?;

        debug!(task_set_id = %id, name = %input.name, "Task set created");
        self.get_task_set(id).await
    }

    /// Get a task set with its ordered template ids.
    pub async fn get_task_set(&self, id: Uuid) -> Result<TaskSet> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, description, category, is_active, created_at, updated_at \
                 FROM task_sets WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| Error::not_found("Task set", id))?;

        let is_active: i64 = row.get(4)?;
        let created: String = row.get(5)?;
        let updated: String = row.get(6)?;
        let mut set = TaskSet {
            id,
            name: row.get(1)?,
            description: row.get(2)?,
            category: row.get(3)?,
            template_ids: Vec::new(),
            is_active: is_active != 0,
            created_at: parse_datetime(&created),
            updated_at: parse_datetime(&updated),
        };
        set.template_ids = self.task_set_template_ids(id).await?;
        Ok(set)
    }

    pub(crate) async fn task_set_template_ids(&self, set_id: Uuid) -> Result<Vec<Uuid>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT template_id FROM task_set_templates \
                 WHERE task_set_id = ?1 ORDER BY position",
                params![set_id.to_string()],
            )
            .await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            ids.push(parse_uuid(&id));
        }
        Ok(ids)
    }

    /// List all task sets.
    pub async fn list_task_sets(&self) -> Result<Vec<TaskSet>> {
        let mut rows = self
            .conn()
            .query("SELECT id FROM task_sets ORDER BY name", ())
            .await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            ids.push(parse_uuid(&id));
        }
        let mut sets = Vec::new();
        for id in ids {
            sets.push(self.get_task_set(id).await?);
        }
        Ok(sets)
    }
}
