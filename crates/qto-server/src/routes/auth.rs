// SPDX-License-Identifier: MIT OR Apache-2.0
//! Authentication routes.

use crate::AppState;
use crate::auth_extract::CurrentUser;
use crate::dto::{TokenResponse, UserOut};
use crate::error::ApiResult;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<(StatusCode, Json<UserOut>)> {
    let user = state
        .auth
        .register(&body.email, &body.password, &body.full_name)?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginBody>,
) -> ApiResult<Json<TokenResponse>> {
    let (user, token) = state.auth.login(&body.email, &body.password)?;
    Ok(Json(TokenResponse::new(user, token)))
}

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub token: String,
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenBody>,
) -> ApiResult<Json<UserOut>> {
    let user = state.auth.verify_email(&body.token)?;
    Ok(Json(user.into()))
}

pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    state.auth.resend_verification(user.id)?;
    Ok((StatusCode::ACCEPTED, Json(json!({"status": "sent"}))))
}

#[derive(Debug, Deserialize)]
pub struct CompleteInviteBody {
    pub token: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

pub async fn complete_invite(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CompleteInviteBody>,
) -> ApiResult<Json<TokenResponse>> {
    let (user, _invitation, token) =
        state
            .auth
            .complete_invite(&body.token, &body.password, &body.full_name)?;
    Ok(Json(TokenResponse::new(user, token)))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserOut> {
    Json(user.into())
}
