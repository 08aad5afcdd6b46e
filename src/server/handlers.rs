// Request handlers for the info, stream and health endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, info, warn};

use super::health::ServiceStatus;
use super::AppState;
use crate::resolver::errors::ResolveError;
use crate::resolver::models::{AudioMetadata, ContentId};

/// JSON error body `{ "error": kind, "message": text }` with the mapped status.
#[derive(Debug)]
pub struct ApiError(pub ResolveError);

impl From<ResolveError> for ApiError {
    fn from(error: ResolveError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub title: String,
    pub author: String,
    pub length_seconds: u64,
    pub mime_type: String,
    pub content_length: u64,
}

impl From<&AudioMetadata> for InfoResponse {
    fn from(metadata: &AudioMetadata) -> Self {
        Self {
            title: metadata.title.clone(),
            author: metadata.author.clone(),
            length_seconds: metadata.duration_seconds,
            mime_type: metadata.mime_or_default().to_string(),
            content_length: metadata.content_length,
        }
    }
}

fn log_failure(endpoint: &str, id: &ContentId, err: &ResolveError) {
    match err.status_code() {
        404 | 403 => warn!(endpoint, content_id = %id, error = %err, "resolution refused"),
        _ => error!(endpoint, content_id = %id, error = %err, "resolution failed"),
    }
}

pub async fn resolve_info(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<InfoResponse>> {
    let id = ContentId::parse(&raw_id)?;

    if let Some(metadata) = state.cache.get(&id) {
        info!(content_id = %id, "metadata served from cache");
        return Ok(Json(InfoResponse::from(&metadata)));
    }

    let audio = state
        .orchestrator
        .resolve_metadata(&id)
        .await
        .inspect_err(|e| log_failure("resolve-info", &id, e))?;

    let response = InfoResponse::from(&audio.metadata);
    state.cache.insert(id, audio.metadata);
    Ok(Json(response))
}

pub async fn stream(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Response> {
    let id = ContentId::parse(&raw_id)?;
    let live = state
        .orchestrator
        .resolve_stream(&id)
        .await
        .inspect_err(|e| log_failure("stream", &id, e))?;
    Ok(live.into_response())
}

/// Routes with an empty identifier segment.
pub async fn missing_id() -> ApiError {
    ApiError(ResolveError::InvalidIdentifier(String::new()))
}

pub async fn health(State(state): State<AppState>) -> Response {
    let report = state.health.check(state.started_at).await;
    let status = match report.status {
        ServiceStatus::Error => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(report)).into_response()
}
