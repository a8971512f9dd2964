//! Agent roster endpoints.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::agents::model::{AgentInput, AgentUpdate};
use crate::error::Error;

use super::{AppState, ok, ok_empty, ok_list};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/agents", get(list_agents).post(create_agent))
        .route(
            "/api/agents/{id}",
            get(get_agent).put(update_agent).delete(delete_agent),
        )
}

async fn list_agents(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let agents = state.store.list_agents().await?;
    Ok(ok_list(agents))
}

async fn create_agent(
    State(state): State<AppState>,
    Json(input): Json<AgentInput>,
) -> Result<impl IntoResponse, Error> {
    let agent = state.store.create_agent(&input).await?;
    Ok(ok(agent))
}

async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let agent = state.store.get_agent(id).await?;
    Ok(ok(agent))
}

async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<AgentUpdate>,
) -> Result<impl IntoResponse, Error> {
    let agent = state.store.update_agent(id, &update).await?;
    Ok(ok(agent))
}

async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    state.store.delete_agent(id).await?;
    Ok(ok_empty())
}
