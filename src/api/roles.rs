//! Role, permission, and user endpoints.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::Error;
use crate::roles::model::{RoleInput, RoleUpdate, UserInput};

use super::{AppState, ok, ok_empty, ok_list};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/roles", get(list_roles).post(create_role))
        .route(
            "/api/roles/{id}",
            get(get_role).put(update_role).delete(delete_role),
        )
        .route("/api/permissions", get(list_permissions))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/{id}", get(get_user).delete(delete_user))
        .route("/api/users/{id}/role", put(set_user_role))
}

#[derive(Debug, Deserialize)]
struct RoleQuery {
    #[serde(default)]
    include_permissions: bool,
    #[serde(default)]
    include_user_count: bool,
}

async fn list_roles(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let roles = state.store.list_roles().await?;
    Ok(ok_list(roles))
}

async fn create_role(
    State(state): State<AppState>,
    Json(input): Json<RoleInput>,
) -> Result<impl IntoResponse, Error> {
    let role = state.store.create_role(&input).await?;
    Ok(ok(role))
}

async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<RoleQuery>,
) -> Result<impl IntoResponse, Error> {
    let role = state
        .store
        .get_role(id, q.include_permissions, q.include_user_count)
        .await?;
    Ok(ok(role))
}

async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<RoleUpdate>,
) -> Result<impl IntoResponse, Error> {
    let role = state.store.update_role(id, &update).await?;
    Ok(ok(role))
}

async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    state.store.delete_role(id).await?;
    Ok(ok_empty())
}

async fn list_permissions(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let permissions = state.store.list_permissions().await?;
    Ok(ok_list(permissions))
}

async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let users = state.store.list_users().await?;
    Ok(ok_list(users))
}

async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<UserInput>,
) -> Result<impl IntoResponse, Error> {
    let user = state.store.create_user(&input).await?;
    Ok(ok(user))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let user = state.store.get_user(id).await?;
    Ok(ok(user))
}

#[derive(Debug, Deserialize)]
struct SetRoleRequest {
    role_id: Option<Uuid>,
}

async fn set_user_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetRoleRequest>,
) -> Result<impl IntoResponse, Error> {
    let user = state.store.set_user_role(id, req.role_id).await?;
    Ok(ok(user))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    state.store.delete_user(id).await?;
    Ok(ok_empty())
}
