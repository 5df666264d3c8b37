// SPDX-License-Identifier: MIT OR Apache-2.0
//! Job routes: submission, reads, SSE streaming.

use crate::AppState;
use crate::auth_extract::CurrentUser;
use crate::error::ApiResult;
use crate::sse;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use qto_core::{Job, JobEvent, JobStatus, Role, StageEvent, channel};
use qto_engine::CreateJob;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    pub project_id: Uuid,
    pub file_id: Uuid,
    #[serde(default)]
    pub price_list_id: Option<Uuid>,
    #[serde(default)]
    pub supplier_id: Option<Uuid>,
}

/// `POST /jobs`: debit-first submission, then background dispatch.
pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateJobBody>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    qto_rbac::require_project_access(&state.store, body.project_id, user.id, Role::Editor)?;
    let job = state.engine.create_job(
        user.id,
        CreateJob {
            project_id: body.project_id,
            file_id: body.file_id,
            price_list_id: body.price_list_id,
            supplier_id: body.supplier_id,
        },
    )?;
    state.queue.submit(job.id).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Json<Vec<Job>> {
    Json(state.store.jobs_for_user(user.id))
}

fn load_authorized(state: &AppState, user_id: Uuid, job_id: Uuid) -> ApiResult<Job> {
    let job = state.store.job_get(job_id)?;
    qto_rbac::require_project_access(&state.store, job.project_id, user_id, Role::Viewer)
        .map_err(|_| qto_error::Error::not_found(format!("job {job_id}")))?;
    Ok(job)
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    Ok(Json(load_authorized(&state, user.id, id)?))
}

/// `POST /jobs/{id}/cancel`: write the `canceled` status; the worker
/// observes it at its next commit. In-flight extractor calls run to
/// completion.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    let job = state.store.job_get(id)?;
    qto_rbac::require_project_access(&state.store, job.project_id, user.id, Role::Editor)?;
    let canceled = state
        .store
        .job_update_status(id, JobStatus::Canceled, None)?;
    Ok(Json(canceled))
}

pub async fn events(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<JobEvent>>> {
    load_authorized(&state, user.id, id)?;
    Ok(Json(state.store.job_events(id)))
}

/// `GET /jobs/{id}/stream`: SSE, stored events first, then live.
pub async fn stream(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    load_authorized(&state, user.id, id)?;

    // Subscribe before reading the log so no event can fall in between.
    let live = qto_broker::EventBus::subscribe(&state.broker, &channel::job(id));
    let historical: Vec<serde_json::Value> = state
        .store
        .job_events(id)
        .iter()
        .map(|ev| serde_json::to_value(StageEvent::from(ev)).unwrap_or_default())
        .collect();

    Ok(sse::historical_then_live(historical, live))
}
