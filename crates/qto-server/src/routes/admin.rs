// SPDX-License-Identifier: MIT OR Apache-2.0
//! Admin routes. Payment capture is out of scope; credit grants are the
//! only way balance enters the system besides the signup grant.

use crate::AppState;
use crate::auth_extract::CurrentUser;
use crate::error::ApiResult;
use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct GrantBody {
    pub user_id: Uuid,
    pub amount: u64,
}

pub async fn grant_credits(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<GrantBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let balance = state.auth.grant_credits(user.id, body.user_id, body.amount)?;
    Ok(Json(json!({"user_id": body.user_id, "balance": balance})))
}
