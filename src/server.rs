//! HTTP front end for reset, backup, stored-backup management and inventory.
//!
//! Every operation runs on the blocking pool while holding the shared connection,
//! so resets and backups in one process never interleave. Every response carries
//! permissive CORS headers and every route answers `OPTIONS` with `ok`.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::backup::catalog::{delete_backup, list_all_backups};
use crate::backup::restore::MapRestoreService;
use crate::backup::{BackupError, BackupOptions, BackupOutcome, MapBackupService};
use crate::blob::{self, BlobStore};
use crate::config::MapkeeperConfig;
use crate::db;
use crate::inventory::inventory;
use crate::reset::{
    MapResetService, MapScope, ResetError, ResetOptions, ResetOutcome, ValidationError,
    HEALTH_CHECK_MESSAGE,
};
use crate::store::{DataStore, SqliteStore, StoreError};

const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
const ALLOWED_METHODS: &str = "GET, POST, DELETE, OPTIONS";
const INVENTORY_TYPES: [&str; 3] = ["deep_desert", "hagga_basin", "combined"];

#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    blobs: Arc<dyn BlobStore>,
    config: Arc<MapkeeperConfig>,
}

impl AppState {
    pub fn new(conn: Connection, blobs: Arc<dyn BlobStore>, config: MapkeeperConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            blobs,
            config: Arc::new(config),
        }
    }
}

/// Handler error, rendered as `{success: false, error}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl From<ResetError> for ApiError {
    fn from(err: ResetError) -> Self {
        match err {
            ResetError::Validation(e) => Self::Validation(e),
            ResetError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<BackupError> for ApiError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::Validation(e) => Self::Validation(e),
            e @ BackupError::UnknownBackup(_) => Self::NotFound(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) | Self::InvalidJson(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = json!({
            "success": false,
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Fields stay untyped so the health-check sentinel and map-type validation see
/// every input before anything requires a string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetRequest {
    #[serde(default)]
    map_type: Option<Value>,
    #[serde(default)]
    confirm_text: Option<Value>,
}

impl ResetRequest {
    fn map_type(&self) -> String {
        field_text(self.map_type.as_ref()).unwrap_or_default()
    }

    /// Only a string can match a confirmation phrase; anything else reads as empty.
    fn confirm_text(&self) -> &str {
        match &self.confirm_text {
            Some(Value::String(text)) => text,
            _ => "",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupRequest {
    #[serde(default)]
    map_type: Option<Value>,
}

/// Text of a JSON field. Non-strings are rendered as JSON so validation errors
/// show what was sent.
fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// An empty body reads as `{}`.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidJson(e.to_string()))
}

/// Run `op` on the blocking pool with the shared connection locked.
async fn with_store<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn DataStore, &dyn BlobStore, &MapkeeperConfig) -> Result<T, ApiError>
        + Send
        + 'static,
{
    let db = Arc::clone(&state.db);
    let blobs = Arc::clone(&state.blobs);
    let config = Arc::clone(&state.config);

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| ApiError::Internal(format!("db lock poisoned: {e}")))?;
        let store = SqliteStore::new(&conn);
        op(&store, blobs.as_ref(), &config)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("db task failed: {e}")))?
}

async fn reset(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let request: ResetRequest = parse_body(&body)?;
    let map_type = request.map_type();
    tracing::info!(%map_type, "reset requested");

    let outcome = with_store(&state, move |store, blobs, config| {
        let service = MapResetService::new(store, blobs, ResetOptions::from(config));
        Ok(service.handle(&map_type, request.confirm_text())?)
    })
    .await?;

    let body = match outcome {
        ResetOutcome::HealthCheck => json!({ "success": true, "message": HEALTH_CHECK_MESSAGE }),
        ResetOutcome::Completed(report) => {
            serde_json::to_value(report).map_err(|e| ApiError::Internal(e.to_string()))?
        }
    };
    Ok(Json(body))
}

async fn backup(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let request: BackupRequest = parse_body(&body)?;
    let map_type = field_text(request.map_type.as_ref());
    tracing::info!(?map_type, "backup requested");

    let outcome = with_store(&state, move |store, blobs, config| {
        let service = MapBackupService::new(store, blobs, BackupOptions::from(config));
        Ok(service.handle(map_type.as_deref())?)
    })
    .await?;

    let body = match outcome {
        BackupOutcome::HealthCheck => json!({ "success": true, "message": HEALTH_CHECK_MESSAGE }),
        BackupOutcome::Completed(report) => {
            serde_json::to_value(report).map_err(|e| ApiError::Internal(e.to_string()))?
        }
    };
    Ok(Json(body))
}

async fn list_backups(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let backups = with_store(&state, |_, blobs, config| {
        Ok(list_all_backups(blobs, &config.backup.folder)?)
    })
    .await?;
    Ok(Json(json!({ "backupsByType": backups })))
}

async fn remove_backup(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    tracing::info!(backup = %name, "backup deletion requested");
    let message = format!("Backup {name} deleted");
    let deleted = with_store(&state, move |_, blobs, config| {
        Ok(delete_backup(blobs, &config.backup.folder, &name)?)
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "message": message,
        "deletedFiles": deleted,
    })))
}

async fn restore_backup(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    tracing::info!(backup = %name, "restore requested");
    let report = with_store(&state, move |store, blobs, config| {
        let service = MapRestoreService::new(store, blobs, BackupOptions::from(config));
        Ok(service.restore(&name)?)
    })
    .await?;
    serde_json::to_value(report)
        .map(Json)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn map_inventory(
    State(state): State<AppState>,
    Path(map_type): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let scope: MapScope = map_type
        .parse()
        .map_err(|_| ValidationError::invalid_map_type(&map_type, &INVENTORY_TYPES))?;

    let counts = with_store(&state, move |store, _, _| Ok(inventory(store, scope)?)).await?;
    Ok(Json(json!({
        "mapType": scope.as_str(),
        "inventory": counts,
        "empty": counts.is_empty(),
    })))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let db = Arc::clone(&state.db);
    let db_healthy = tokio::task::spawn_blocking(move || {
        db.lock()
            .ok()
            .and_then(|conn| db::check_database_health(&conn).ok())
            .is_some_and(|report| report.integrity_ok)
    })
    .await
    .unwrap_or(false);

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "dbHealthy": db_healthy,
    }))
}

async fn preflight() -> &'static str {
    "ok"
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/reset", post(reset).options(preflight))
        .route("/backup", post(backup).options(preflight))
        .route("/backups", get(list_backups).options(preflight))
        .route("/backups/{name}", delete(remove_backup).options(preflight))
        .route("/backups/{name}/restore", post(restore_backup).options(preflight))
        .route("/inventory/{map_type}", get(map_inventory).options(preflight))
        .route("/health", get(health).options(preflight))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the database and blob store, then serve until ctrl-c.
pub async fn serve(config: MapkeeperConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let blobs: Arc<dyn BlobStore> =
        Arc::from(blob::create_blob_store(&config.blobs, config.resolved_blob_root())?);
    tracing::info!(backend = %config.blobs.backend, bucket = %config.blobs.bucket, "blob store ready");

    let bind_addr = config.bind_addr();
    let router = build_router(AppState::new(conn, blobs, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "mapkeeper listening on http://{bind_addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
