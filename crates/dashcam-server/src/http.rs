use crate::export::export_session;
use crate::metrics;
use crate::state::{AppState, SessionStats, UiEvent};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use dashcam_core::{
    map_url, CaptureError, GalleryError, LoopState, PhotoEntry, PhotoName, SessionHandle,
    SessionSummary,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

const DEFAULT_EVENT_LIMIT: usize = 100;

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<GalleryError> for ApiError {
    fn from(err: GalleryError) -> Self {
        let status = match &err {
            GalleryError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            GalleryError::Name(_) => StatusCode::BAD_REQUEST,
            GalleryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<CaptureError> for ApiError {
    fn from(err: CaptureError) -> Self {
        let status = match &err {
            CaptureError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            CaptureError::CaptureFailure(_) | CaptureError::LocationUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CaptureError::StorageFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<GalleryError>() {
            Ok(gallery) => gallery.into(),
            Err(other) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", other)),
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct CaptureStatus {
    state: LoopState,
    session: Option<SessionHandle>,
    stats: Option<SessionStats>,
    interval_ms: u64,
    quality: f32,
}

#[derive(Serialize)]
struct StopResponse {
    stopped: Option<SessionHandle>,
}

#[derive(Serialize)]
struct PhotoResponse {
    #[serde(flatten)]
    entry: PhotoEntry,
    url: String,
    map_url: Option<String>,
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: usize,
}

#[derive(Serialize)]
struct MapResponse {
    url: String,
}

#[derive(Serialize)]
struct ExportResponse {
    path: PathBuf,
}

#[derive(Default, Deserialize)]
struct SaveRequest {
    #[serde(default)]
    names: Vec<String>,
}

#[derive(Serialize)]
struct SaveResponse {
    saved: Vec<PathBuf>,
}

#[derive(Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    let files = ServeDir::new(state.gallery.store().sessions_dir());

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/capture", get(capture_status_handler))
        .route("/capture/start", post(capture_start_handler))
        .route("/capture/stop", post(capture_stop_handler))
        .route("/sessions", get(list_sessions_handler))
        .route("/sessions/:id", delete(delete_session_handler))
        .route("/sessions/:id/photos", get(list_photos_handler))
        .route("/sessions/:id/photos/:name", delete(delete_photo_handler))
        .route("/sessions/:id/photos/:name/map", get(map_handler))
        .route("/sessions/:id/export", post(export_handler))
        .route("/sessions/:id/save", post(save_handler))
        .route("/events", get(events_handler))
        .nest_service("/files", files)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.overall_health().await)
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed\n".to_string()),
    }
}

async fn capture_status_handler(State(state): State<AppState>) -> Json<CaptureStatus> {
    let config = state.capture.config();
    let session = state.capture.active_session();
    let stats = session
        .as_ref()
        .and_then(|s| state.session_stats.get(&s.id).map(|e| e.value().clone()));

    Json(CaptureStatus {
        state: state.capture.state(),
        session,
        stats,
        interval_ms: config.interval.as_millis() as u64,
        quality: config.quality,
    })
}

async fn capture_start_handler(State(state): State<AppState>) -> ApiResult<SessionHandle> {
    match state.capture.start().await {
        Ok(session) => Ok(Json(session)),
        Err(e) => {
            error!("Failed to start capture: {}", e);
            state.push_event(UiEvent::Error(e.to_string())).await;
            Err(e.into())
        }
    }
}

async fn capture_stop_handler(State(state): State<AppState>) -> Json<StopResponse> {
    Json(StopResponse {
        stopped: state.capture.stop(),
    })
}

async fn list_sessions_handler(State(state): State<AppState>) -> ApiResult<Vec<SessionSummary>> {
    Ok(Json(state.gallery.list_sessions()?))
}

async fn list_photos_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<PhotoResponse>> {
    let photos = state
        .gallery
        .list_photos(&id)?
        .into_iter()
        .map(|entry| PhotoResponse {
            url: format!("/files/{}/{}", id, entry.name),
            map_url: entry.map_url(),
            entry,
        })
        .collect();
    Ok(Json(photos))
}

async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DeleteResponse> {
    if state.capture.active_session().is_some_and(|s| s.id == id) {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("session '{}' is being captured into", id),
        ));
    }

    let deleted = state.gallery.delete_sessions(&[id])?;
    state.push_event(UiEvent::SessionsDeleted { count: deleted }).await;
    Ok(Json(DeleteResponse { deleted }))
}

async fn delete_photo_handler(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> ApiResult<DeleteResponse> {
    let deleted = state.gallery.delete_photos(&id, &[name])?;
    state
        .push_event(UiEvent::PhotosDeleted {
            session_id: id,
            count: deleted,
        })
        .await;
    Ok(Json(DeleteResponse { deleted }))
}

async fn map_handler(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> ApiResult<MapResponse> {
    let path = state.gallery.photo_path(&id, &name)?;
    if !path.is_file() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("photo '{}' not found in '{}'", name, id),
        ));
    }
    let photo = PhotoName::decode(&name).map_err(GalleryError::from)?;
    Ok(Json(MapResponse {
        url: map_url(&photo.fix),
    }))
}

async fn export_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ExportResponse> {
    let gallery = state.gallery.clone();
    let out_dir = state.export_dir.clone();
    let session_id = id.clone();

    let path = tokio::task::spawn_blocking(move || export_session(&gallery, &session_id, &out_dir))
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            warn!("Export of {} failed: {:#}", id, e);
            ApiError::from(e)
        })?;

    metrics::record_export();
    state
        .push_event(UiEvent::SessionExported {
            session_id: id,
            path: path.display().to_string(),
        })
        .await;
    Ok(Json(ExportResponse { path }))
}

async fn save_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<SaveRequest>>,
) -> ApiResult<SaveResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let gallery = state.gallery.clone();
    let library_dir = state.library_dir.clone();
    let session_id = id.clone();

    // copying a whole session is slow disk work
    let saved = tokio::task::spawn_blocking(move || {
        gallery.save_to_library(&session_id, &request.names, &library_dir)
    })
    .await
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;
    state
        .push_event(UiEvent::SavedToLibrary {
            session_id: id,
            count: saved.len(),
        })
        .await;
    Ok(Json(SaveResponse { saved }))
}

async fn events_handler(
    State(state): State<AppState>,
    Query(params): Query<EventsQuery>,
) -> impl IntoResponse {
    Json(state.get_events(params.limit.unwrap_or(DEFAULT_EVENT_LIMIT)).await)
}
