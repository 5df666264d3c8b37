// SPDX-License-Identifier: MIT OR Apache-2.0
//! File routes: presigned upload minting, content PUT, metadata reads.

use crate::AppState;
use crate::auth_extract::CurrentUser;
use crate::error::ApiResult;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use qto_core::{FileType, Role, StoredFile};
use qto_error::Error;
use qto_presign::Action;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::str::FromStr as _;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateFileBody {
    pub project_id: Uuid,
    pub filename: String,
    pub file_type: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PresignedUpload {
    pub file_id: Uuid,
    pub upload_url: String,
    pub headers: HashMap<String, String>,
}

/// `POST /files`: create the metadata row and mint a one-shot upload URL.
pub async fn create_presigned_upload(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateFileBody>,
) -> ApiResult<(StatusCode, Json<PresignedUpload>)> {
    qto_rbac::require_project_access(&state.store, body.project_id, user.id, Role::Editor)?;

    let file_type = FileType::from_str(&body.file_type)
        .map_err(|reason| Error::validation_field("file_type", reason))?;
    if !state.settings.allowed_upload_types.contains(&file_type) {
        return Err(Error::validation_field(
            "file_type",
            format!("uploads of type {file_type} are disabled"),
        )
        .into());
    }
    if body.filename.trim().is_empty() {
        return Err(Error::validation_field("filename", "filename is required").into());
    }

    let file = state.store.file_insert(StoredFile {
        id: Uuid::new_v4(),
        project_id: body.project_id,
        user_id: user.id,
        filename: body.filename.trim().to_string(),
        file_type,
        size: 0,
        checksum: String::new(),
        created_at: state.store.now(),
        uploaded_at: None,
    })?;

    let path = format!("/api/v1/files/{}/content", file.id);
    let upload_url = state
        .presigner
        .presign(&path, Action::Upload, &file.id.to_string(), body.ttl_seconds);

    let mut headers = HashMap::new();
    headers.insert(
        "Content-Type".to_string(),
        body.content_type
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    );

    Ok((
        StatusCode::CREATED,
        Json(PresignedUpload {
            file_id: file.id,
            upload_url,
            headers,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct PresignQuery {
    pub act: String,
    pub exp: i64,
    pub sig: String,
}

/// `PUT /files/{id}/content`: authenticated by the presigned token alone.
///
/// Enforces the action whitelist, the upload cap, the magic-byte check,
/// and write-once semantics.
pub async fn upload_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<PresignQuery>,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    if query.act != Action::Upload.as_str() {
        return Err(Error::validation_field("act", "invalid action").into());
    }
    let file = state.store.file_get(id)?;
    state
        .presigner
        .verify(&query.act, &id.to_string(), query.exp, &query.sig)
        .map_err(qto_error::Error::from)?;

    if file.has_content() {
        return Err(Error::conflict("file content was already uploaded").into());
    }
    let limit = state.settings.max_upload_bytes;
    if body.len() as u64 > limit {
        return Err(Error::TooLarge {
            size: body.len() as u64,
            limit,
        }
        .into());
    }
    if body.is_empty() {
        return Err(Error::validation("upload body is empty").into());
    }
    if !file.file_type.magic_matches(&body) {
        return Err(Error::validation_field(
            "content",
            format!("content does not look like {}", file.file_type),
        )
        .into());
    }

    let dest = state.settings.uploads_dir().join(id.to_string());
    std::fs::write(&dest, &body).map_err(qto_error::Error::from)?;

    let mut hasher = Sha256::new();
    hasher.update(&body);
    let checksum: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();

    let now = state.store.now();
    let size = body.len() as u64;
    state.store.file_update(id, |f| {
        f.size = size;
        f.checksum = checksum;
        f.uploaded_at = Some(now);
    })?;

    Ok(Json(json!({"uploaded": true, "size": size})))
}

/// `GET /files/{id}`: metadata, visible to project members.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StoredFile>> {
    let file = state.store.file_get(id)?;
    qto_rbac::require_project_access(&state.store, file.project_id, user.id, Role::Viewer)
        .map_err(|_| Error::not_found(format!("file {id}")))?;
    Ok(Json(file))
}
