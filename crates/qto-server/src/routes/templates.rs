// SPDX-License-Identifier: MIT OR Apache-2.0
//! Templates and estimate snapshots.

use crate::AppState;
use crate::auth_extract::CurrentUser;
use crate::error::ApiResult;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use qto_core::{Estimate, Role, Template};
use qto_error::Error;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateTemplateBody {
    pub name: String,
    pub body: serde_json::Value,
}

pub async fn create_template(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateTemplateBody>,
) -> ApiResult<(StatusCode, Json<Template>)> {
    if body.name.trim().is_empty() {
        return Err(Error::validation_field("name", "template name is required").into());
    }
    let template = state.store.template_insert(Template {
        id: Uuid::new_v4(),
        owner_id: user.id,
        name: body.name.trim().to_string(),
        body: body.body,
        created_at: state.store.now(),
    })?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Json<Vec<Template>> {
    Json(state.store.templates_for_user(user.id))
}

pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let template = state.store.template_get(id)?;
    if template.owner_id != user.id {
        return Err(Error::not_found(format!("template {id}")).into());
    }
    state.store.template_delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateEstimateBody {
    pub name: String,
}

pub async fn create_estimate(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(job_id): Path<Uuid>,
    Json(body): Json<CreateEstimateBody>,
) -> ApiResult<(StatusCode, Json<Estimate>)> {
    let estimate = state.exporter.save_estimate(job_id, &body.name, user.id)?;
    Ok((StatusCode::CREATED, Json(estimate)))
}

pub async fn list_estimates(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Estimate>>> {
    qto_rbac::require_project_access(&state.store, project_id, user.id, Role::Viewer)?;
    Ok(Json(state.store.estimates_for_project(project_id)))
}
