// SPDX-License-Identifier: MIT OR Apache-2.0
//! Project routes.

use crate::AppState;
use crate::auth_extract::CurrentUser;
use crate::error::ApiResult;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::NaiveDate;
use qto_core::{Project, ProjectStatus, Role};
use qto_error::Error;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateProjectBody {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateProjectBody>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    if body.name.trim().is_empty() {
        return Err(Error::validation_field("name", "project name is required").into());
    }
    let now = state.store.now();
    let project = state.store.project_insert(Project {
        id: Uuid::new_v4(),
        owner_id: user.id,
        name: body.name.trim().to_string(),
        description: body.description,
        start_date: body.start_date,
        end_date: body.end_date,
        status: ProjectStatus::Active,
        created_at: now,
        updated_at: now,
    })?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Json<Vec<Project>> {
    Json(state.store.projects_for_user(user.id))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    let (project, _) = qto_rbac::require_project_access(&state.store, id, user.id, Role::Viewer)?;
    Ok(Json(project))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    qto_rbac::require_project_access(&state.store, id, user.id, Role::Owner)?;
    state.store.project_delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}
