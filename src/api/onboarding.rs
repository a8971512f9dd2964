//! Onboarding endpoints: enrollment, the current-stage aggregate view,
//! explicit stage completion, and dashboard stats.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::error::Error;
use crate::onboarding::model::{CompleteStageRequest, EnrollRequest};

use super::{AppState, ok};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/onboarding/stats", get(stats))
        .route("/api/onboarding/{agent_id}/current-stage", get(current_stage))
        .route(
            "/api/onboarding/{agent_id}/complete-stage",
            post(complete_stage),
        )
        .route("/api/onboarding/{agent_id}/enroll", post(enroll))
}

async fn current_stage(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let summary = state.store.onboarding_summary(agent_id).await?;
    Ok(ok(summary))
}

async fn complete_stage(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Json(req): Json<CompleteStageRequest>,
) -> Result<impl IntoResponse, Error> {
    let record = state.store.complete_stage(agent_id, &req).await?;
    Ok(ok(record))
}

async fn enroll(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Json(req): Json<EnrollRequest>,
) -> Result<impl IntoResponse, Error> {
    let record = state.store.enroll_agent(agent_id, req.pipeline_id).await?;
    Ok(ok(record))
}

async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let stats = state.store.onboarding_stats().await?;
    Ok(ok(stats))
}
