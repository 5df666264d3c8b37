// SPDX-License-Identifier: MIT OR Apache-2.0
//! BoQ routes.

use crate::AppState;
use crate::auth_extract::CurrentUser;
use crate::error::ApiResult;
use axum::Json;
use axum::extract::{Path, State};
use qto_boq::{BulkPatch, BulkSummary, UpdateOptions, ValidationReport};
use qto_core::{BoqItem, BoqItemPatch, Role};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Vec<BoqItem>>> {
    let job = state.store.job_get(job_id)?;
    qto_rbac::require_project_access(&state.store, job.project_id, user.id, Role::Viewer)
        .map_err(|_| qto_error::Error::not_found(format!("job {job_id}")))?;
    Ok(Json(state.store.boq_for_job(job_id)))
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub item: BoqItem,
    pub modified: bool,
}

/// `PATCH /boq/items/{id}`: optimistic single-row edit; a stale
/// `expected_updated_at` yields 409 with both versions in the body.
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<BoqItemPatch>,
) -> ApiResult<Json<UpdateResponse>> {
    let outcome = state
        .editor
        .update_one(id, &patch, user.id, UpdateOptions::default())?;
    Ok(Json(UpdateResponse {
        item: outcome.item,
        modified: outcome.modified,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BulkBody {
    pub items: Vec<BulkPatch>,
}

pub async fn bulk_update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<BulkBody>,
) -> ApiResult<Json<BulkSummary>> {
    Ok(Json(state.editor.update_many(body.items, user.id)))
}

pub async fn validate(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<ValidationReport>> {
    Ok(Json(state.editor.validate(job_id, user.id)?))
}
