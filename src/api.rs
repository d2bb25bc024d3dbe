// 🛰️ REST API - schema-driven CRUD over every entity
//
// GET    /api/health
// GET    /api/v1/
// GET    /api/v1/:entity/        (list, exact-match query filters)
// POST   /api/v1/:entity/
// GET    /api/v1/:entity/:id/
// PUT    /api/v1/:entity/:id/
// PATCH  /api/v1/:entity/:id/
// DELETE /api/v1/:entity/:id/
//
// Every route also answers without the trailing slash.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::db;
use crate::error::StoreError;
use crate::schema::{self, EntitySchema, ENTITIES};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db.lock().map_err(|_| ApiError::Unavailable)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    /// Request body is not a JSON document
    MalformedBody(String),
    /// The connection mutex was poisoned by a panicking handler
    Unavailable,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": message.into() }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Store(StoreError::UnknownEntity(_)) | ApiError::Store(StoreError::NotFound { .. }) => {
                detail(StatusCode::NOT_FOUND, "Not found.")
            }
            ApiError::Store(StoreError::Validation(errors)) => {
                (StatusCode::BAD_REQUEST, Json(errors)).into_response()
            }
            ApiError::Store(err @ StoreError::Protected { .. }) => {
                warn!(error = %err, "delete blocked");
                detail(StatusCode::CONFLICT, err.to_string())
            }
            ApiError::Store(err) => {
                error!(error = %err, "store failure");
                detail(StatusCode::INTERNAL_SERVER_ERROR, "A server error occurred.")
            }
            ApiError::MalformedBody(message) => {
                detail(StatusCode::BAD_REQUEST, format!("JSON parse error - {}", message))
            }
            ApiError::Unavailable => {
                error!("database lock poisoned");
                detail(StatusCode::INTERNAL_SERVER_ERROR, "A server error occurred.")
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn entity(name: &str) -> ApiResult<&'static EntitySchema> {
    schema::find(name).ok_or_else(|| StoreError::UnknownEntity(name.to_string()).into())
}

/// Ids that are not integers can never match a row.
fn parse_id(entity: &EntitySchema, raw: &str) -> ApiResult<i64> {
    raw.parse::<i64>().map_err(|_| {
        ApiError::Store(StoreError::NotFound {
            entity: entity.name.to_string(),
            id: 0,
        })
    })
}

fn parse_body(body: &Bytes) -> ApiResult<Value> {
    serde_json::from_slice(body).map_err(|e| ApiError::MalformedBody(e.to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

/// GET /api/v1/ - one URL per entity
async fn api_root() -> impl IntoResponse {
    let endpoints: Map<String, Value> = ENTITIES
        .iter()
        .map(|e| (e.name.to_string(), Value::from(format!("/api/v1/{}/", e.name))))
        .collect();
    Json(Value::Object(endpoints))
}

/// GET /api/v1/:entity/
async fn list_rows(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(filters): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    let entity = entity(&name)?;
    let conn = state.lock()?;
    let rows = db::list(&conn, entity, &filters)?;
    Ok(Json(rows).into_response())
}

/// POST /api/v1/:entity/
async fn create_row(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let entity = entity(&name)?;
    let payload = parse_body(&body)?;
    let conn = state.lock()?;
    let record = db::create(&conn, entity, &payload)?;
    info!(entity = entity.name, id = ?record.get("id"), "created");
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

/// GET /api/v1/:entity/:id/
async fn retrieve_row(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let entity = entity(&name)?;
    let id = parse_id(entity, &id)?;
    let conn = state.lock()?;
    Ok(Json(db::retrieve(&conn, entity, id)?).into_response())
}

async fn update_row(state: AppState, name: String, id: String, body: Bytes, partial: bool) -> ApiResult<Response> {
    let entity = entity(&name)?;
    let id = parse_id(entity, &id)?;
    let payload = parse_body(&body)?;
    let conn = state.lock()?;
    let record = db::update(&conn, entity, id, &payload, partial)?;
    info!(entity = entity.name, id, partial, "updated");
    Ok(Json(record).into_response())
}

/// PUT /api/v1/:entity/:id/
async fn replace_row(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Response> {
    update_row(state, name, id, body, false).await
}

/// PATCH /api/v1/:entity/:id/
async fn patch_row(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Response> {
    update_row(state, name, id, body, true).await
}

/// DELETE /api/v1/:entity/:id/
async fn delete_row(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let entity = entity(&name)?;
    let id = parse_id(entity, &id)?;
    let conn = state.lock()?;
    db::delete(&conn, entity, id)?;
    info!(entity = entity.name, id, "deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let collection = get(list_rows).post(create_row);
    let member = get(retrieve_row)
        .put(replace_row)
        .patch(patch_row)
        .delete(delete_row);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/v1", get(api_root))
        .route("/api/v1/", get(api_root))
        .route("/api/v1/:entity", collection.clone())
        .route("/api/v1/:entity/", collection)
        .route("/api/v1/:entity/:id", member.clone())
        .route("/api/v1/:entity/:id/", member)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
