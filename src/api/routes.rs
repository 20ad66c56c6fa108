//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::model::{EventFilter, IncidentFilter};
use crate::storage::StoreError;

/// Default page size for `GET /logs`.
const DEFAULT_LOG_LIMIT: usize = 100;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/logs", get(list_logs))
        .route("/logs/{id}", get(get_log))
        .route("/incidents", get(list_incidents))
        .route("/incidents/{id}", get(get_incident))
        .route("/detections/run", post(run_detections))
}

enum ApiError {
    NotFound(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => {
                tracing::warn!(error = %m, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(json!({ "error": { "message": message } }))).into_response()
    }
}

/// Run a store call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn list_logs(
    State(state): State<AppState>,
    Query(mut filter): Query<EventFilter>,
) -> Result<Json<Value>, ApiError> {
    filter.limit = Some(filter.limit.unwrap_or(DEFAULT_LOG_LIMIT));
    let store = state.store.clone();
    let events = blocking(move || store.search_events(&filter)).await?;
    Ok(Json(json!({ "data": events, "meta": { "total": events.len() } })))
}

async fn get_log(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    match blocking(move || store.get_event(id)).await? {
        Some(event) => Ok(Json(json!({ "data": event }))),
        None => Err(ApiError::NotFound(format!("log {id} not found"))),
    }
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(filter): Query<IncidentFilter>,
) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    let incidents = blocking(move || store.search_incidents(&filter)).await?;
    Ok(Json(json!({ "data": incidents, "meta": { "total": incidents.len() } })))
}

async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    match blocking(move || store.get_incident(id)).await? {
        Some(incident) => Ok(Json(json!({ "data": incident }))),
        None => Err(ApiError::NotFound(format!("incident {id} not found"))),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunRequest {
    /// Falls back to the configured policy.
    auto_create: Option<bool>,
}

async fn run_detections(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<Value>, ApiError> {
    let engine = state.engine.clone();
    let summary = tokio::task::spawn_blocking(move || match req.auto_create {
        Some(auto_create) => engine.run_scan_with(auto_create),
        None => engine.run_scan(),
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "data": summary,
        "meta": {
            "total": summary.total_count,
            "incidents_created": summary.incidents_created
        }
    })))
}
