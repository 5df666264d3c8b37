// SPDX-License-Identifier: MIT OR Apache-2.0
//! Export and artifact routes.

use crate::AppState;
use crate::auth_extract::CurrentUser;
use crate::error::ApiResult;
use crate::sse;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use qto_core::{Artifact, Role, channel};
use qto_export::ExportFormat;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr as _;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: String,
}

/// `POST /jobs/{id}/export?format=csv|xlsx|pdf`.
pub async fn export(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(job_id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<(StatusCode, Json<Artifact>)> {
    let format = ExportFormat::from_str(&query.format)?;
    let artifact = state.exporter.export(job_id, format, user.id)?;
    Ok((StatusCode::CREATED, Json(artifact)))
}

pub async fn list_artifacts(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Artifact>>> {
    let job = state.store.job_get(job_id)?;
    qto_rbac::require_project_access(&state.store, job.project_id, user.id, Role::Viewer)
        .map_err(|_| qto_error::Error::not_found(format!("job {job_id}")))?;
    Ok(Json(state.store.artifacts_for_job(job_id)))
}

#[derive(Debug, Deserialize)]
pub struct PresignBody {
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

/// `POST /artifacts/{id}/presign`.
pub async fn presign(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    body: Option<Json<PresignBody>>,
) -> ApiResult<Json<serde_json::Value>> {
    let ttl = body.and_then(|Json(b)| b.ttl_seconds);
    let url = state.exporter.presign_download(id, user.id, ttl)?;
    Ok(Json(json!({"url": url})))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub act: String,
    pub exp: i64,
    pub sig: String,
}

/// `GET /artifacts/{id}/download`: authorized by the signature alone.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<impl IntoResponse> {
    let artifact = state
        .exporter
        .verify_download(id, &query.act, query.exp, &query.sig)?;
    let bytes = std::fs::read(&artifact.path).map_err(qto_error::Error::from)?;

    let content_type = match artifact.kind.rsplit(':').next() {
        Some("csv") => "text/csv",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    };
    let filename = std::path::Path::new(&artifact.path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.to_string());

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

/// `GET /jobs/{id}/exports/stream`: SSE over the export lifecycle.
pub async fn stream(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let job = state.store.job_get(job_id)?;
    qto_rbac::require_project_access(&state.store, job.project_id, user.id, Role::Viewer)
        .map_err(|_| qto_error::Error::not_found(format!("job {job_id}")))?;
    let live = qto_broker::EventBus::subscribe(&state.broker, &channel::job_exports(job_id));
    Ok(sse::live_only(live))
}
