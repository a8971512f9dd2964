//! Pipeline and stage storage.
//!
//! Stage saves reconcile by stable id: submitted entries with a known id
//! keep that stage's identity, entries without one become new stages, and
//! existing stages absent from the submission are deleted. Positions are
//! always rewritten to a dense 0..n-1 sequence in submission order.

use std::collections::HashSet;

use chrono::Utc;
use libsql::{Connection, params};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pipeline::model::{AccessMode, Pipeline, PipelineInput, PipelineStatus, Stage};

use super::db::{Store, count_on, parse_datetime, parse_uuid};

fn status_to_str(status: PipelineStatus) -> &'static str {
    match status {
        PipelineStatus::Active => "active",
        PipelineStatus::Inactive => "inactive",
    }
}

fn str_to_status(s: &str) -> PipelineStatus {
    match s {
        "inactive" => PipelineStatus::Inactive,
        _ => PipelineStatus::Active,
    }
}

fn access_to_str(mode: AccessMode) -> &'static str {
    match mode {
        AccessMode::All => "all",
        AccessMode::SelectedUsers => "selected_users",
    }
}

fn str_to_access(s: &str) -> AccessMode {
    match s {
        "selected_users" => AccessMode::SelectedUsers,
        _ => AccessMode::All,
    }
}

async fn stage_ids_of(conn: &Connection, pipeline_id: Uuid) -> Result<HashSet<Uuid>> {
    let mut rows = conn
        .query(
            "SELECT id FROM stages WHERE pipeline_id = ?1",
            params![pipeline_id.to_string()],
        )
        .await?;
    let mut ids = HashSet::new();
    while let Some(row) = rows.next().await? {
        let id: String = row.get(0)?;
        ids.insert(parse_uuid(&id));
    }
    Ok(ids)
}

/// Write the submitted stages for a pipeline inside an open transaction.
async fn write_stages(
    tx: &Connection,
    pipeline_id: Uuid,
    input: &PipelineInput,
    existing: &HashSet<Uuid>,
) -> Result<()> {
    let mut kept = HashSet::new();

    for (position, stage) in input.stages.iter().enumerate() {
        let position = position as i64;
        match stage.id {
            Some(id) if existing.contains(&id) => {
                kept.insert(id);
                tx.execute(
                    "UPDATE stages SET name = ?1, position = ?2, color = ?3 WHERE id = ?4",
                    params![
                        stage.name.clone(),
                        position,
                        stage.color.clone(),
                        id.to_string()
                    ],
                )
                .await?;
                tx.execute(
                    "DELETE FROM stage_task_sets WHERE stage_id = ?1",
                    params![id.to_string()],
                )
                .await?;
                link_task_sets(tx, id, &stage.required_task_sets).await?;
            }
            Some(id) => {
                return Err(Error::Validation(format!(
                    "Unknown stage id for this pipeline: {id}"
                )));
            }
            None => {
                let id = Uuid::new_v4();
                kept.insert(id);
                tx.execute(
                    "INSERT INTO stages (id, pipeline_id, name, position, color) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id.to_string(),
                        pipeline_id.to_string(),
                        stage.name.clone(),
                        position,
                        stage.color.clone()
                    ],
                )
                .await?;
                link_task_sets(tx, id, &stage.required_task_sets).await?;
            }
        }
    }

    // Stages dropped from the submission are deleted; their links cascade.
    // Tasks referencing them keep the stored id (read back as orphaned).
    for id in existing.difference(&kept) {
        tx.execute("DELETE FROM stages WHERE id = ?1", params![id.to_string()])
            .await?;
    }
    Ok(())
}

async fn link_task_sets(tx: &Connection, stage_id: Uuid, task_set_ids: &[Uuid]) -> Result<()> {
    for set_id in task_set_ids {
        let affected = tx
            .execute(
                "INSERT OR IGNORE INTO stage_task_sets (stage_id, task_set_id) \
                 SELECT ?1, id FROM task_sets WHERE id = ?2",
                params![stage_id.to_string(), set_id.to_string()],
            )
            .await?;
        if affected == 0 {
            let exists = count_on(
                tx,
                "SELECT COUNT(*) FROM task_sets WHERE id = ?1",
                params![set_id.to_string()],
            )
            .await?;
            if exists == 0 {
                return Err(Error::Validation(format!("Unknown task set id: {set_id}")));
            }
        }
    }
    Ok(())
}

impl Store {
    /// Create a pipeline with its stages.
    pub async fn create_pipeline(&self, input: &PipelineInput) -> Result<Pipeline> {
        input.validate()?;
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        self.with_write_slot(async {
            let tx = self.conn().transaction().await?;
            tx.execute(
                "INSERT INTO pipelines (id, name, description, status, access_mode, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    input.name.clone(),
                    input.description.clone(),
                    status_to_str(input.status),
                    access_to_str(input.access_mode),
                    now.clone(),
                    now.clone(),
                ],
            )
            .await?;
            write_stages(&tx, id, input, &HashSet::new()).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        debug!(pipeline_id = %id, name = %input.name, "Pipeline created");
        self.get_pipeline(id).await
    }

    /// Update a pipeline, reconciling its stages by stable id.
    pub async fn update_pipeline(&self, id: Uuid, input: &PipelineInput) -> Result<Pipeline> {
        input.validate()?;
        self.get_pipeline(id).await?;

        self.with_write_slot(async {
            let now = Utc::now().to_rfc3339();
            let tx = self.conn().transaction().await?;
            tx.execute(
                "UPDATE pipelines SET name = ?1, description = ?2, status = ?3, \
                 access_mode = ?4, updated_at = ?5 WHERE id = ?6",
                params![
                    input.name.clone(),
                    input.description.clone(),
                    status_to_str(input.status),
                    access_to_str(input.access_mode),
                    now,
                    id.to_string(),
                ],
            )
            .await?;
            let existing = stage_ids_of(&tx, id).await?;
            write_stages(&tx, id, input, &existing).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        self.get_pipeline(id).await
    }

    /// Get a pipeline with its ordered stages.
    pub async fn get_pipeline(&self, id: Uuid) -> Result<Pipeline> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, description, status, access_mode, created_at, updated_at \
                 FROM pipelines WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| Error::not_found("Pipeline", id))?;

        let status: String = row.get(3)?;
        let access: String = row.get(4)?;
        let created: String = row.get(5)?;
        let updated: String = row.get(6)?;
        let mut pipeline = Pipeline {
            id,
            name: row.get(1)?,
            description: row.get(2)?,
            status: str_to_status(&status),
            access_mode: str_to_access(&access),
            stages: Vec::new(),
            created_at: parse_datetime(&created),
            updated_at: parse_datetime(&updated),
        };
        pipeline.stages = self.stages_of(id).await?;
        Ok(pipeline)
    }

    pub(crate) async fn stages_of(&self, pipeline_id: Uuid) -> Result<Vec<Stage>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, position, color FROM stages \
                 WHERE pipeline_id = ?1 ORDER BY position",
                params![pipeline_id.to_string()],
            )
            .await?;
        let mut stages = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let position: i64 = row.get(2)?;
            let color: Option<String> = row.get(3).ok();
            stages.push(Stage {
                id: parse_uuid(&id),
                pipeline_id,
                name: row.get(1)?,
                position: position.max(0) as u32,
                color,
                required_task_sets: Vec::new(),
            });
        }
        for stage in &mut stages {
            stage.required_task_sets = self.stage_task_sets(stage.id).await?;
        }
        Ok(stages)
    }

    async fn stage_task_sets(&self, stage_id: Uuid) -> Result<Vec<Uuid>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT task_set_id FROM stage_task_sets WHERE stage_id = ?1",
                params![stage_id.to_string()],
            )
            .await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            ids.push(parse_uuid(&id));
        }
        Ok(ids)
    }

    /// List all pipelines with stages.
    pub async fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        let mut rows = self
            .conn()
            .query("SELECT id FROM pipelines ORDER BY name", ())
            .await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            ids.push(parse_uuid(&id));
        }
        let mut pipelines = Vec::new();
        for id in ids {
            pipelines.push(self.get_pipeline(id).await?);
        }
        Ok(pipelines)
    }

    /// Delete a pipeline. Rejected while any enrollment references it.
    pub async fn delete_pipeline(&self, id: Uuid) -> Result<()> {
        self.get_pipeline(id).await?;

        self.with_write_slot(async {
            let tx = self.conn().transaction().await?;
            let enrolled = count_on(
                &tx,
                "SELECT COUNT(*) FROM onboarding_records WHERE pipeline_id = ?1",
                params![id.to_string()],
            )
            .await?;
            if enrolled > 0 {
                return Err(Error::InUse(format!(
                    "Pipeline still has {enrolled} enrolled agent(s)"
                )));
            }
            // Stage rows cascade from the pipeline; links cascade from stages
            tx.execute(
                "DELETE FROM pipelines WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        debug!(pipeline_id = %id, "Pipeline deleted");
        Ok(())
    }

    /// Delete one stage and compact the remaining positions to 0..n-1.
    /// Tasks referencing the deleted stage keep their stored id.
    pub async fn delete_stage(&self, pipeline_id: Uuid, stage_id: Uuid) -> Result<Pipeline> {
        self.get_pipeline(pipeline_id).await?;

        self.with_write_slot(async {
            let tx = self.conn().transaction().await?;
            let affected = tx
                .execute(
                    "DELETE FROM stages WHERE id = ?1 AND pipeline_id = ?2",
                    params![stage_id.to_string(), pipeline_id.to_string()],
                )
                .await?;
            if affected == 0 {
                return Err(Error::not_found("Stage", stage_id));
            }

            // Compact positions of the survivors
            let mut rows = tx
                .query(
                    "SELECT id FROM stages WHERE pipeline_id = ?1 ORDER BY position",
                    params![pipeline_id.to_string()],
                )
                .await?;
            let mut survivors = Vec::new();
            while let Some(row) = rows.next().await? {
                let id: String = row.get(0)?;
                survivors.push(id);
            }
            for (position, id) in survivors.iter().enumerate() {
                tx.execute(
                    "UPDATE stages SET position = ?1 WHERE id = ?2",
                    params![position as i64, id.clone()],
                )
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await?;

        self.get_pipeline(pipeline_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::model::{AgentInput, AgentStatus};
    use crate::pipeline::model::StageInput;

    fn stage_input(name: &str) -> StageInput {
        StageInput {
            id: None,
            name: name.into(),
            color: None,
            required_task_sets: Vec::new(),
        }
    }

    fn sales_input() -> PipelineInput {
        PipelineInput {
            name: "Sales".into(),
            description: "New agent onboarding".into(),
            status: PipelineStatus::Active,
            access_mode: AccessMode::All,
            stages: vec![
                stage_input("Lead"),
                stage_input("Qualified"),
                stage_input("Won"),
            ],
        }
    }

    fn assert_dense_positions(pipeline: &Pipeline) {
        for (i, stage) in pipeline.stages.iter().enumerate() {
            assert_eq!(
                stage.position, i as u32,
                "Stage '{}' should be at position {i}",
                stage.name
            );
        }
    }

    #[tokio::test]
    async fn create_assigns_dense_positions() {
        let store = Store::new_memory().await.unwrap();
        let pipeline = store.create_pipeline(&sales_input()).await.unwrap();
        assert_eq!(pipeline.stages.len(), 3);
        assert_dense_positions(&pipeline);
        assert_eq!(pipeline.stages[0].name, "Lead");
        assert_eq!(pipeline.stages[2].name, "Won");
    }

    #[tokio::test]
    async fn reorder_and_rename_keeps_stage_identity() {
        let store = Store::new_memory().await.unwrap();
        let pipeline = store.create_pipeline(&sales_input()).await.unwrap();
        let lead_id = pipeline.stages[0].id;
        let won_id = pipeline.stages[2].id;

        // Move "Won" first and rename "Lead" — identities must survive
        let mut input = sales_input();
        input.stages = vec![
            StageInput {
                id: Some(won_id),
                name: "Closed Won".into(),
                color: None,
                required_task_sets: Vec::new(),
            },
            StageInput {
                id: Some(lead_id),
                name: "Prospect".into(),
                color: Some("#ff8800".into()),
                required_task_sets: Vec::new(),
            },
        ];
        let updated = store.update_pipeline(pipeline.id, &input).await.unwrap();

        assert_eq!(updated.stages.len(), 2);
        assert_dense_positions(&updated);
        assert_eq!(updated.stages[0].id, won_id);
        assert_eq!(updated.stages[0].name, "Closed Won");
        assert_eq!(updated.stages[1].id, lead_id);
        assert_eq!(updated.stages[1].name, "Prospect");
        assert_eq!(updated.stages[1].color.as_deref(), Some("#ff8800"));
    }

    #[tokio::test]
    async fn omitted_stage_is_deleted() {
        let store = Store::new_memory().await.unwrap();
        let pipeline = store.create_pipeline(&sales_input()).await.unwrap();

        let mut input = sales_input();
        input.stages = pipeline.stages[..2]
            .iter()
            .map(|s| StageInput {
                id: Some(s.id),
                name: s.name.clone(),
                color: None,
                required_task_sets: Vec::new(),
            })
            .collect();
        let updated = store.update_pipeline(pipeline.id, &input).await.unwrap();
        assert_eq!(updated.stages.len(), 2);
        assert_dense_positions(&updated);
    }

    #[tokio::test]
    async fn foreign_stage_id_rejected() {
        let store = Store::new_memory().await.unwrap();
        let pipeline = store.create_pipeline(&sales_input()).await.unwrap();

        let mut input = sales_input();
        input.stages = vec![StageInput {
            id: Some(Uuid::new_v4()),
            name: "Ghost".into(),
            color: None,
            required_task_sets: Vec::new(),
        }];
        let err = store.update_pipeline(pipeline.id, &input).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Rolled back: original stages intact
        let unchanged = store.get_pipeline(pipeline.id).await.unwrap();
        assert_eq!(unchanged.stages.len(), 3);
    }

    #[tokio::test]
    async fn repeated_stage_id_rejected() {
        let store = Store::new_memory().await.unwrap();
        let pipeline = store.create_pipeline(&sales_input()).await.unwrap();
        let lead_id = pipeline.stages[0].id;

        // Same stage submitted twice must not eat a second position
        let mut input = sales_input();
        input.stages = vec![
            StageInput {
                id: Some(lead_id),
                name: "Lead".into(),
                color: None,
                required_task_sets: Vec::new(),
            },
            StageInput {
                id: Some(lead_id),
                name: "Lead again".into(),
                color: None,
                required_task_sets: Vec::new(),
            },
        ];
        let err = store.update_pipeline(pipeline.id, &input).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let unchanged = store.get_pipeline(pipeline.id).await.unwrap();
        assert_eq!(unchanged.stages.len(), 3);
        assert_dense_positions(&unchanged);
    }

    #[tokio::test]
    async fn delete_stage_compacts_positions() {
        let store = Store::new_memory().await.unwrap();
        let pipeline = store.create_pipeline(&sales_input()).await.unwrap();
        let middle = pipeline.stages[1].id;

        let updated = store.delete_stage(pipeline.id, middle).await.unwrap();
        assert_eq!(updated.stages.len(), 2);
        assert_dense_positions(&updated);
        assert_eq!(updated.stages[0].name, "Lead");
        assert_eq!(updated.stages[1].name, "Won");
    }

    #[tokio::test]
    async fn delete_missing_stage_is_not_found() {
        let store = Store::new_memory().await.unwrap();
        let pipeline = store.create_pipeline(&sales_input()).await.unwrap();
        let err = store
            .delete_stage(pipeline.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_pipeline_without_enrollments() {
        let store = Store::new_memory().await.unwrap();
        let pipeline = store.create_pipeline(&sales_input()).await.unwrap();
        store.delete_pipeline(pipeline.id).await.unwrap();
        assert!(store.get_pipeline(pipeline.id).await.is_err());
    }

    #[tokio::test]
    async fn delete_pipeline_with_enrollment_rejected() {
        let store = Store::new_memory().await.unwrap();
        let pipeline = store.create_pipeline(&sales_input()).await.unwrap();
        let agent = store
            .create_agent(&AgentInput {
                first_name: "Dana".into(),
                last_name: "Reyes".into(),
                email: "dana@example.com".into(),
                phone: None,
                license_number: None,
                status: AgentStatus::Active,
                commission_split: None,
                banking_info: None,
                emergency_contact: None,
            })
            .await
            .unwrap();
        store.enroll_agent(agent.id, pipeline.id).await.unwrap();

        let err = store.delete_pipeline(pipeline.id).await.unwrap_err();
        assert!(matches!(err, Error::InUse(_)));
        assert!(store.get_pipeline(pipeline.id).await.is_ok());
    }

    #[tokio::test]
    async fn empty_name_rejected() {
        let store = Store::new_memory().await.unwrap();
        let mut input = sales_input();
        input.name = "".into();
        assert!(store.create_pipeline(&input).await.is_err());
    }
}
