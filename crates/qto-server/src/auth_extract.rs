// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bearer-token extraction.
//!
//! Tokens arrive in the `Authorization` header. The query-parameter form
//! (`?access_token=`) is accepted only on SSE stream endpoints, where
//! `EventSource` cannot set headers — and nowhere else, so tokens never
//! end up in access logs for regular routes.

use crate::AppState;
use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use qto_core::User;
use qto_error::Error;
use std::sync::Arc;

/// The authenticated account, as an extractor.
pub struct CurrentUser(pub User);

fn bearer_from_parts(parts: &Parts) -> Option<String> {
    if let Some(auth) = parts.headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = auth.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    // Query tokens are restricted to streaming endpoints.
    if parts.uri.path().ends_with("/stream") {
        if let Some(query) = parts.uri.query() {
            for pair in query.split('&') {
                if let Some(token) = pair.strip_prefix("access_token=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_from_parts(parts)
            .ok_or_else(|| ApiError(Error::Unauthenticated("not authenticated".into())))?;
        let user = state.auth.authenticate(&token)?;
        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str, auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("Authorization", auth);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn header_token_wins_everywhere() {
        let p = parts("/api/v1/jobs", Some("Bearer abc"));
        assert_eq!(bearer_from_parts(&p).as_deref(), Some("abc"));
    }

    #[test]
    fn query_token_only_on_stream_paths() {
        let p = parts("/api/v1/jobs/1/stream?access_token=xyz", None);
        assert_eq!(bearer_from_parts(&p).as_deref(), Some("xyz"));

        let p = parts("/api/v1/jobs?access_token=xyz", None);
        assert_eq!(bearer_from_parts(&p), None);
    }

    #[test]
    fn malformed_header_is_ignored() {
        let p = parts("/api/v1/jobs", Some("Token abc"));
        assert_eq!(bearer_from_parts(&p), None);
    }
}
