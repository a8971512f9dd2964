//! Task template and task set endpoints.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::catalog::model::{TaskSetInput, TemplateInput};
use crate::error::Error;

use super::{AppState, ok, ok_list};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/task-templates",
            get(list_templates).post(create_template),
        )
        .route(
            "/api/task-templates/{id}",
            get(get_template).put(update_template),
        )
        .route("/api/task-sets", get(list_task_sets).post(create_task_set))
        .route("/api/task-sets/{id}", get(get_task_set))
}

#[derive(Debug, Deserialize)]
struct TemplateQuery {
    #[serde(default)]
    active_only: bool,
}

async fn list_templates(
    State(state): State<AppState>,
    Query(q): Query<TemplateQuery>,
) -> Result<impl IntoResponse, Error> {
    let templates = state.store.list_templates(q.active_only).await?;
    Ok(ok_list(templates))
}

async fn create_template(
    State(state): State<AppState>,
    Json(input): Json<TemplateInput>,
) -> Result<impl IntoResponse, Error> {
    let template = state.store.create_template(&input).await?;
    Ok(ok(template))
}

async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let template = state.store.get_template(id).await?;
    Ok(ok(template))
}

async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<TemplateInput>,
) -> Result<impl IntoResponse, Error> {
    let template = state.store.update_template(id, &input).await?;
    Ok(ok(template))
}

async fn list_task_sets(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let sets = state.store.list_task_sets().await?;
    Ok(ok_list(sets))
}

async fn create_task_set(
    State(state): State<AppState>,
    Json(input): Json<TaskSetInput>,
) -> Result<impl IntoResponse, Error> {
    let set = state.store.create_task_set(&input).await?;
    Ok(ok(set))
}

async fn get_task_set(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let set = state.store.get_task_set(id).await?;
    Ok(ok(set))
}
