//! Pipeline builder endpoints.
//!
//! PUT is a single save of the whole definition: stage reconciliation
//! (create/update/delete by stable id) happens in the store.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use uuid::Uuid;

use crate::error::Error;
use crate::pipeline::model::PipelineInput;

use super::{AppState, ok, ok_empty, ok_list};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/pipelines", get(list_pipelines).post(create_pipeline))
        .route(
            "/api/pipelines/{id}",
            get(get_pipeline).put(update_pipeline).delete(delete_pipeline),
        )
        .route(
            "/api/pipelines/{id}/stages/{stage_id}",
            delete(delete_stage),
        )
}

async fn list_pipelines(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let pipelines = state.store.list_pipelines().await?;
    Ok(ok_list(pipelines))
}

async fn create_pipeline(
    State(state): State<AppState>,
    Json(input): Json<PipelineInput>,
) -> Result<impl IntoResponse, Error> {
    let pipeline = state.store.create_pipeline(&input).await?;
    Ok(ok(pipeline))
}

async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let pipeline = state.store.get_pipeline(id).await?;
    Ok(ok(pipeline))
}

async fn update_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<PipelineInput>,
) -> Result<impl IntoResponse, Error> {
    let pipeline = state.store.update_pipeline(id, &input).await?;
    Ok(ok(pipeline))
}

async fn delete_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    state.store.delete_pipeline(id).await?;
    Ok(ok_empty())
}

async fn delete_stage(
    State(state): State<AppState>,
    Path((id, stage_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, Error> {
    let pipeline = state.store.delete_stage(id, stage_id).await?;
    Ok(ok(pipeline))
}
