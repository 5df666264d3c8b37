// SPDX-License-Identifier: MIT OR Apache-2.0
//! Collaboration routes: members, invitations, comments, notifications.

use crate::AppState;
use crate::auth_extract::CurrentUser;
use crate::dto::InvitationOut;
use crate::error::ApiResult;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use qto_core::{Activity, Collaborator, Comment, CommentContext, Notification, Role};
use qto_error::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// -- collaborators ----------------------------------------------------------

pub async fn list_collaborators(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Collaborator>>> {
    Ok(Json(state.collab.list_collaborators(project_id, user.id)?))
}

#[derive(Debug, Deserialize)]
pub struct AddCollaboratorBody {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
}

pub async fn add_collaborator(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<Uuid>,
    Json(body): Json<AddCollaboratorBody>,
) -> ApiResult<(StatusCode, Json<Collaborator>)> {
    let target = match (body.user_id, body.email.as_deref()) {
        (Some(id), _) => id,
        (None, Some(email)) => state
            .store
            .user_by_email(email)
            .ok_or_else(|| Error::not_found(format!("user {email}")))?
            .id,
        (None, None) => {
            return Err(Error::validation("either user_id or email is required").into());
        }
    };
    let collab = state
        .collab
        .add_collaborator(project_id, user.id, target, body.role)?;
    Ok((StatusCode::CREATED, Json(collab)))
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleBody {
    pub role: Role,
}

pub async fn change_role(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((project_id, collaborator_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ChangeRoleBody>,
) -> ApiResult<Json<Collaborator>> {
    Ok(Json(state.collab.change_role(
        project_id,
        user.id,
        collaborator_id,
        body.role,
    )?))
}

pub async fn remove_collaborator(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((project_id, collaborator_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state
        .collab
        .remove_collaborator(project_id, user.id, collaborator_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// -- invitations ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InviteBody {
    pub email: String,
    pub role: Role,
}

/// Response of an invitation creation: the only place the raw token ever
/// appears.
#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub invitation: InvitationOut,
    pub token: String,
}

pub async fn invite(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<Uuid>,
    Json(body): Json<InviteBody>,
) -> ApiResult<(StatusCode, Json<InviteResponse>)> {
    let (invitation, token) = state
        .collab
        .invite(project_id, user.id, &body.email, body.role)?;
    Ok((
        StatusCode::CREATED,
        Json(InviteResponse {
            invitation: invitation.into(),
            token,
        }),
    ))
}

pub async fn list_invitations(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<InvitationOut>>> {
    let invitations = state.collab.list_invitations(project_id, user.id)?;
    Ok(Json(invitations.into_iter().map(Into::into).collect()))
}

pub async fn revoke_invitation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((project_id, invitation_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<InvitationOut>> {
    let revoked = state
        .collab
        .revoke_invitation(project_id, user.id, invitation_id)?;
    Ok(Json(revoked.into()))
}

#[derive(Debug, Deserialize)]
pub struct AcceptBody {
    pub token: String,
}

pub async fn accept_invitation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<AcceptBody>,
) -> ApiResult<Json<Collaborator>> {
    let (_invitation, collaborator) = state.collab.accept_invitation(&body.token, user.id)?;
    Ok(Json(collaborator))
}

// -- comments ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub context: CommentContext,
    pub context_id: String,
    pub body: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<Uuid>,
    Json(body): Json<CommentBody>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let comment = state.collab.add_comment(
        project_id,
        user.id,
        body.context,
        &body.context_id,
        &body.body,
        body.parent_id,
    )?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Comment>>> {
    Ok(Json(state.collab.list_comments(project_id, user.id)?))
}

// -- activity & notifications ----------------------------------------------

pub async fn list_activities(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Activity>>> {
    Ok(Json(state.collab.list_activities(project_id, user.id)?))
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Json<Vec<Notification>> {
    Json(state.collab.list_notifications(user.id))
}

pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .collab
        .mark_notification_read(user.id, notification_id)?;
    Ok(StatusCode::NO_CONTENT)
}
