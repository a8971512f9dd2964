//! REST surface. All handlers return the uniform envelope
//! `{success, data?, error?, total?}`.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::{DatabaseError, Error};
use crate::store::Store;

pub mod agents;
pub mod catalog;
pub mod onboarding;
pub mod pipelines;
pub mod roles;
pub mod tasks;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
}

/// Uniform response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// Single-item success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
        total: None,
    })
}

/// List success envelope with a total count.
pub fn ok_list<T: Serialize>(items: Vec<T>) -> Json<ApiResponse<Vec<T>>> {
    let total = items.len() as u64;
    Json(ApiResponse {
        success: true,
        data: Some(items),
        error: None,
        total: Some(total),
    })
}

/// Success envelope with no payload (deletes).
pub fn ok_empty() -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        success: true,
        data: None,
        error: None,
        total: None,
    })
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Validation(_) | Error::InUse(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) | Error::Database(DatabaseError::Constraint(_)) => {
                StatusCode::CONFLICT
            }
            Error::Database(DatabaseError::Timeout { .. }) => StatusCode::REQUEST_TIMEOUT,
            Error::Database(DatabaseError::Connection(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Database(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.to_string()),
            total: None,
        };
        (status, Json(body)).into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "brokerage-crm"
    }))
}

/// Build the full application router.
pub fn router(store: Arc<Store>) -> Router {
    let state = AppState { store };
    Router::new()
        .route("/health", get(health))
        .merge(agents::routes())
        .merge(roles::routes())
        .merge(pipelines::routes())
        .merge(catalog::routes())
        .merge(tasks::routes())
        .merge(onboarding::routes())
        .with_state(state)
}
