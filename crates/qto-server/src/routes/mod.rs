// SPDX-License-Identifier: MIT OR Apache-2.0
//! Route handlers, grouped by resource.

pub mod admin;
pub mod auth;
pub mod boq;
pub mod collab;
pub mod exports;
pub mod files;
pub mod jobs;
pub mod projects;
pub mod templates;

use axum::Json;
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::json;

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339(),
    }))
}
