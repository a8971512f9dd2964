//! Task endpoints: ad-hoc creation, per-agent listing, completion toggle,
//! and atomic task-set assignment.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::Error;
use crate::tasks::model::TaskInput;

use super::{AppState, ok, ok_list};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}/toggle", post(toggle_task))
        .route("/api/agents/{agent_id}/tasks", get(list_agent_tasks))
        .route("/api/task-sets/{id}/assign", post(assign_task_set))
}

async fn create_task(
    State(state): State<AppState>,
    Json(input): Json<TaskInput>,
) -> Result<impl IntoResponse, Error> {
    let task = state.store.create_task(&input).await?;
    Ok(ok(task))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let task = state.store.get_task(id).await?;
    Ok(ok(task))
}

async fn list_agent_tasks(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    state.store.get_agent(agent_id).await?;
    let tasks = state.store.list_agent_tasks(agent_id).await?;
    Ok(ok_list(tasks))
}

/// Flip the completion state of a task.
async fn toggle_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let task = state.store.get_task(id).await?;
    let task = state.store.set_task_completed(id, !task.is_completed).await?;
    Ok(ok(task))
}

#[derive(Debug, Deserialize)]
struct AssignRequest {
    agent_id: Uuid,
    #[serde(default)]
    stage_id: Option<Uuid>,
}

async fn assign_task_set(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> Result<impl IntoResponse, Error> {
    let tasks = state
        .store
        .assign_task_set(id, req.agent_id, req.stage_id)
        .await?;
    Ok(ok_list(tasks))
}
