// SPDX-License-Identifier: MIT OR Apache-2.0
//! Handler tests over the assembled router.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt as _;
use qto_server::{AppState, build_app};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt as _;

struct TestApp {
    app: Router,
    state: Arc<AppState>,
    _dir: tempfile::TempDir,
}

fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::for_tests(dir.path());
    TestApp {
        app: build_app(state.clone()),
        state,
        _dir: dir,
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn register_and_login(app: &Router, email: &str) -> String {
    let (status, _) = send(
        app,
        post_json(
            "/api/v1/auth/register",
            None,
            json!({"email": email, "password": "long-enough", "full_name": "T"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        post_json(
            "/api/v1/auth/login",
            None,
            json!({"email": email, "password": "long-enough"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

async fn create_project(app: &Router, token: &str, name: &str) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/api/v1/projects",
            Some(token),
            json!({"name": name}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

// -- health & auth -----------------------------------------------------------

#[tokio::test]
async fn health_is_public() {
    let t = test_app();
    let (status, body) = send(&t.app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let t = test_app();
    let (status, body) = send(&t.app, get("/api/v1/jobs", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn register_returns_no_password_material() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/api/v1/auth/register",
            None,
            json!({"email": "a@b.test", "password": "long-enough", "full_name": "A"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.get("password_hash").is_none());
    assert_eq!(body["email"], "a@b.test");
    assert_eq!(body["email_verified"], false);
}

#[tokio::test]
async fn bad_login_is_401() {
    let t = test_app();
    register_and_login(&t.app, "a@b.test").await;
    let (status, _) = send(
        &t.app,
        post_json(
            "/api/v1/auth/login",
            None,
            json!({"email": "a@b.test", "password": "wrong-password"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn resend_verification_is_rate_limited() {
    let t = test_app();
    let token = register_and_login(&t.app, "a@b.test").await;
    let (status, body) = send(
        &t.app,
        post_json("/api/v1/auth/resend-verification", Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error_code"], "RATE_LIMITED");
    assert!(body["retry_after_secs"].as_u64().unwrap() <= 60);
}

#[tokio::test]
async fn me_reflects_the_token() {
    let t = test_app();
    let token = register_and_login(&t.app, "me@b.test").await;
    let (status, body) = send(&t.app, get("/api/v1/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "me@b.test");
}

// -- projects & RBAC ---------------------------------------------------------

#[tokio::test]
async fn project_hidden_from_non_members() {
    let t = test_app();
    let owner = register_and_login(&t.app, "owner@b.test").await;
    let stranger = register_and_login(&t.app, "stranger@b.test").await;
    let project_id = create_project(&t.app, &owner, "Depot").await;

    let uri = format!("/api/v1/projects/{project_id}");
    let (status, _) = send(&t.app, get(&uri, Some(&owner))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&t.app, get(&uri, Some(&stranger))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "NOT_FOUND");
}

#[tokio::test]
async fn invitation_flow_over_http() {
    let t = test_app();
    let owner = register_and_login(&t.app, "owner@b.test").await;
    let project_id = create_project(&t.app, &owner, "Depot").await;

    let (status, body) = send(
        &t.app,
        post_json(
            &format!("/api/v1/projects/{project_id}/invitations"),
            Some(&owner),
            json!({"email": "new@b.test", "role": "editor"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let raw_token = body["token"].as_str().unwrap().to_string();
    assert!(body["invitation"].get("token_hash").is_none());

    // Duplicate pending invitation -> 409.
    let (status, _) = send(
        &t.app,
        post_json(
            &format!("/api/v1/projects/{project_id}/invitations"),
            Some(&owner),
            json!({"email": "new@b.test", "role": "viewer"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Owner role is not grantable via invitation -> 422.
    let (status, _) = send(
        &t.app,
        post_json(
            &format!("/api/v1/projects/{project_id}/invitations"),
            Some(&owner),
            json!({"email": "other@b.test", "role": "owner"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Complete the invite: creates the account and the membership.
    let (status, body) = send(
        &t.app,
        post_json(
            "/api/v1/auth/complete-invite",
            None,
            json!({"token": raw_token, "password": "long-enough", "full_name": "New"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let invited_token = body["access_token"].as_str().unwrap();

    let uri = format!("/api/v1/projects/{project_id}");
    let (status, _) = send(&t.app, get(&uri, Some(invited_token))).await;
    assert_eq!(status, StatusCode::OK);

    // The consumed invitation token cannot be replayed.
    let (status, _) = send(
        &t.app,
        post_json(
            "/api/v1/auth/complete-invite",
            None,
            json!({"token": raw_token, "password": "long-enough", "full_name": "X"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- files -------------------------------------------------------------------

const VALID_IFC: &str = r#"ISO-10303-21;
HEADER;
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCWALL('0DWgwt6o1FOx7466fPk$jl',$,'Wall A');
#2=IFCDOOR('2hWvXnbbzCWw8lcMd1dR4p',$,'Door 1');
#3=IFCCARTESIANPOINT((0.,0.,0.));
#4=IFCCARTESIANPOINT((5000.,2500.,3000.));
#5=IFCSIUNIT(*,.LENGTHUNIT.,.MILLI.,.METRE.);
ENDSEC;
END-ISO-10303-21;
"#;

async fn presign_upload(app: &Router, token: &str, project_id: &str) -> (String, String) {
    let (status, body) = send(
        app,
        post_json(
            "/api/v1/files",
            Some(token),
            json!({"project_id": project_id, "filename": "model.ifc", "file_type": "IFC"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    (
        body["file_id"].as_str().unwrap().to_string(),
        body["upload_url"].as_str().unwrap().to_string(),
    )
}

async fn put_content(app: &Router, url: &str, content: &[u8]) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("PUT")
        .uri(url)
        .body(Body::from(content.to_vec()))
        .unwrap();
    send(app, req).await
}

#[tokio::test]
async fn upload_lifecycle_with_magic_check_and_write_once() {
    let t = test_app();
    let owner = register_and_login(&t.app, "owner@b.test").await;
    let project_id = create_project(&t.app, &owner, "Depot").await;
    let (_file_id, url) = presign_upload(&t.app, &owner, &project_id).await;

    // Wrong magic for the declared type -> 422.
    let (status, body) = put_content(&t.app, &url, b"%PDF-1.4 nope").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");

    // Proper content uploads fine.
    let (status, body) = put_content(&t.app, &url, VALID_IFC.as_bytes()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["uploaded"], true);

    // Second PUT to the same file id is rejected.
    let (status, body) = put_content(&t.app, &url, VALID_IFC.as_bytes()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "CONFLICT");
}

#[tokio::test]
async fn upload_with_tampered_signature_is_forbidden() {
    let t = test_app();
    let owner = register_and_login(&t.app, "owner@b.test").await;
    let project_id = create_project(&t.app, &owner, "Depot").await;
    let (_, url) = presign_upload(&t.app, &owner, &project_id).await;

    let tampered = format!("{}AAAA", url);
    let (status, _) = put_content(&t.app, &tampered, VALID_IFC.as_bytes()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn upload_with_download_action_is_rejected() {
    let t = test_app();
    let owner = register_and_login(&t.app, "owner@b.test").await;
    let project_id = create_project(&t.app, &owner, "Depot").await;
    let (_, url) = presign_upload(&t.app, &owner, &project_id).await;

    let wrong_action = url.replace("act=upload", "act=download");
    let (status, _) = put_content(&t.app, &wrong_action, VALID_IFC.as_bytes()).await;
    assert_ne!(status, StatusCode::OK);
}

// -- jobs --------------------------------------------------------------------

async fn uploaded_file(app: &Router, token: &str, project_id: &str) -> String {
    let (file_id, url) = presign_upload(app, token, project_id).await;
    let (status, _) = put_content(app, &url, VALID_IFC.as_bytes()).await;
    assert_eq!(status, StatusCode::OK);
    file_id
}

#[tokio::test]
async fn job_submission_debits_and_streams_events() {
    let t = test_app();
    let owner = register_and_login(&t.app, "owner@b.test").await;
    let project_id = create_project(&t.app, &owner, "Depot").await;
    let file_id = uploaded_file(&t.app, &owner, &project_id).await;

    let (status, job) = send(
        &t.app,
        post_json(
            "/api/v1/jobs",
            Some(&owner),
            json!({"project_id": project_id, "file_id": file_id}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{job}");
    let job_id = job["id"].as_str().unwrap().to_string();

    // Default signup credits 1000, cost 400.
    let (_, me) = send(&t.app, get("/api/v1/auth/me", Some(&owner))).await;
    assert_eq!(me["credits_balance"], 600);

    // Wait for the background worker to finish.
    let mut done = Value::Null;
    for _ in 0..200 {
        let (_, body) = send(&t.app, get(&format!("/api/v1/jobs/{job_id}"), Some(&owner))).await;
        if body["status"] == "completed" || body["status"] == "failed" {
            done = body;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(done["status"], "completed", "{done}");
    assert_eq!(done["progress"], 100);

    let (status, events) = send(
        &t.app,
        get(&format!("/api/v1/jobs/{job_id}/events"), Some(&owner)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let stages: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["stage"].as_str().unwrap())
        .collect();
    assert_eq!(
        stages,
        vec!["queued", "validating", "parsing", "takeoff", "complete", "completed"]
    );

    let (status, rows) = send(
        &t.app,
        get(&format!("/api/v1/jobs/{job_id}/boq"), Some(&owner)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!rows.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn submission_without_credits_is_402() {
    let t = test_app();
    let owner = register_and_login(&t.app, "owner@b.test").await;
    let project_id = create_project(&t.app, &owner, "Depot").await;
    let file_id = uploaded_file(&t.app, &owner, &project_id).await;

    // Two jobs land (1000 / 400), the third is refused.
    for _ in 0..2 {
        let (status, _) = send(
            &t.app,
            post_json(
                "/api/v1/jobs",
                Some(&owner),
                json!({"project_id": project_id, "file_id": file_id}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = send(
        &t.app,
        post_json(
            "/api/v1/jobs",
            Some(&owner),
            json!({"project_id": project_id, "file_id": file_id}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error_code"], "PAYMENT_REQUIRED");
    assert_eq!(body["balance"], 200);
}

// -- boq editing over http ---------------------------------------------------

async fn completed_job_with_rows(t: &TestApp, owner: &str, project_id: &str) -> (String, Value) {
    let file_id = uploaded_file(&t.app, owner, project_id).await;
    let (_, job) = send(
        &t.app,
        post_json(
            "/api/v1/jobs",
            Some(owner),
            json!({"project_id": project_id, "file_id": file_id}),
        ),
    )
    .await;
    let job_id = job["id"].as_str().unwrap().to_string();
    for _ in 0..200 {
        let (_, body) = send(&t.app, get(&format!("/api/v1/jobs/{job_id}"), Some(owner))).await;
        if body["status"] == "completed" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let (_, rows) = send(&t.app, get(&format!("/api/v1/jobs/{job_id}/boq"), Some(owner))).await;
    let first = rows.as_array().unwrap()[0].clone();
    (job_id, first)
}

#[tokio::test]
async fn patch_with_stale_version_is_409_with_versions() {
    let t = test_app();
    let owner = register_and_login(&t.app, "owner@b.test").await;
    let project_id = create_project(&t.app, &owner, "Depot").await;
    let (_job_id, row) = completed_job_with_rows(&t, &owner, &project_id).await;
    let item_id = row["id"].as_str().unwrap();
    let version = row["updated_at"].clone();

    // First writer wins.
    let patch = |qty: f64, expected: &Value| {
        Request::builder()
            .method("PATCH")
            .uri(format!("/api/v1/boq/items/{item_id}"))
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {owner}"))
            .body(Body::from(
                json!({"qty": qty, "expected_updated_at": expected}).to_string(),
            ))
            .unwrap()
    };
    let (status, first) = send(&t.app, patch(42.0, &version)).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["modified"], true);

    // Stale token: 60+ seconds behind the new version would be needed to
    // conflict, so re-use the original only if it drifted far enough.
    // Force a clearly stale token instead.
    let stale = json!("2000-01-01T00:00:00Z");
    let (status, body) = send(&t.app, patch(43.0, &stale)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "CONFLICT");
    assert!(body["expected_version"].is_string());
    assert!(body["actual_version"].is_string());
}

#[tokio::test]
async fn bulk_update_returns_summary() {
    let t = test_app();
    let owner = register_and_login(&t.app, "owner@b.test").await;
    let project_id = create_project(&t.app, &owner, "Depot").await;
    let (_job_id, row) = completed_job_with_rows(&t, &owner, &project_id).await;

    let (status, summary) = send(
        &t.app,
        post_json(
            "/api/v1/boq/items/bulk",
            Some(&owner),
            json!({"items": [
                {"id": row["id"], "qty": 7.0, "expected_updated_at": row["updated_at"]},
                {"id": uuid::Uuid::new_v4(), "qty": 1.0}
            ]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total"], 2);
    assert_eq!(summary["updated"], 1);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["errors"].as_array().unwrap().len(), 1);
}

// -- exports -----------------------------------------------------------------

#[tokio::test]
async fn export_then_presigned_download() {
    let t = test_app();
    let owner = register_and_login(&t.app, "owner@b.test").await;
    let project_id = create_project(&t.app, &owner, "Depot").await;
    let (job_id, _) = completed_job_with_rows(&t, &owner, &project_id).await;

    let (status, artifact) = send(
        &t.app,
        post_json(
            &format!("/api/v1/jobs/{job_id}/export?format=csv"),
            Some(&owner),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{artifact}");
    assert_eq!(artifact["kind"], "export:csv");
    let artifact_id = artifact["id"].as_str().unwrap();

    let (status, body) = send(
        &t.app,
        post_json(
            &format!("/api/v1/artifacts/{artifact_id}/presign"),
            Some(&owner),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let url = body["url"].as_str().unwrap().to_string();

    // The download needs no bearer token; the signature authorizes it.
    let resp = t
        .app
        .clone()
        .oneshot(Request::builder().uri(&url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/csv"
    );
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.starts_with("code,description,unit"));
    assert!(text.contains("TOTAL"));

    // Tampering with exp invalidates the link.
    let tampered = {
        let exp: i64 = url
            .split("exp=")
            .nth(1)
            .unwrap()
            .split('&')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        url.replace(&format!("exp={exp}"), &format!("exp={}", exp + 60))
    };
    let (status, _) = send(
        &t.app,
        Request::builder()
            .uri(&tampered)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, artifacts) = send(
        &t.app,
        get(&format!("/api/v1/jobs/{job_id}/artifacts"), Some(&owner)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(artifacts.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_export_format_is_422() {
    let t = test_app();
    let owner = register_and_login(&t.app, "owner@b.test").await;
    let project_id = create_project(&t.app, &owner, "Depot").await;
    let (job_id, _) = completed_job_with_rows(&t, &owner, &project_id).await;

    let (status, _) = send(
        &t.app,
        post_json(
            &format!("/api/v1/jobs/{job_id}/export?format=docx"),
            Some(&owner),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// -- templates & estimates ---------------------------------------------------

#[tokio::test]
async fn templates_are_owner_scoped() {
    let t = test_app();
    let alice = register_and_login(&t.app, "alice@b.test").await;
    let bob = register_and_login(&t.app, "bob@b.test").await;

    let (status, template) = send(
        &t.app,
        post_json(
            "/api/v1/templates",
            Some(&alice),
            json!({"name": "Shell works", "body": [{"code": "05-100", "unit": "m2"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let template_id = template["id"].as_str().unwrap().to_string();

    let (_, mine) = send(&t.app, get("/api/v1/templates", Some(&alice))).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, theirs) = send(&t.app, get("/api/v1/templates", Some(&bob))).await;
    assert!(theirs.as_array().unwrap().is_empty());

    // Bob cannot delete Alice's template.
    let del = |token: &str| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/templates/{template_id}"))
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = send(&t.app, del(&bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&t.app, del(&alice)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn estimate_snapshot_over_http() {
    let t = test_app();
    let owner = register_and_login(&t.app, "owner@b.test").await;
    let project_id = create_project(&t.app, &owner, "Depot").await;
    let (job_id, _) = completed_job_with_rows(&t, &owner, &project_id).await;

    let (status, estimate) = send(
        &t.app,
        post_json(
            &format!("/api/v1/jobs/{job_id}/estimates"),
            Some(&owner),
            json!({"name": "Baseline"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{estimate}");
    assert_eq!(estimate["name"], "Baseline");
    assert!(estimate["totals"]["rows"].as_u64().unwrap() > 0);

    let (status, listed) = send(
        &t.app,
        get(&format!("/api/v1/projects/{project_id}/estimates"), Some(&owner)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

// -- rate limiting -----------------------------------------------------------

#[tokio::test]
async fn api_requests_are_rate_limited_per_ip() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = qto_config::Settings::for_tests(dir.path());
    settings.rate_limit_max_requests = 3;
    let state = AppState::build(
        settings,
        Arc::new(qto_core::SystemClock),
        Arc::new(qto_mail::TracingMailer),
    )
    .unwrap();
    let app = build_app(state);

    let from_ip = |ip: &str| {
        Request::builder()
            .uri("/api/v1/notifications")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    // The first three requests reach the handler (and fail auth, which
    // proves they were admitted).
    for _ in 0..3 {
        let (status, _) = send(&app, from_ip("203.0.113.7")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // The fourth is cut off at the limiter.
    let resp = app.clone().oneshot(from_ip("203.0.113.7")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = resp
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error_code"], "RATE_LIMITED");

    // A different client is unaffected.
    let (status, _) = send(&app, from_ip("198.51.100.9")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Health stays outside the limited surface.
    let (status, _) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
}

// -- admin -------------------------------------------------------------------

#[tokio::test]
async fn credit_grants_are_admin_only() {
    let t = test_app();
    let user_token = register_and_login(&t.app, "user@b.test").await;
    let (_, me) = send(&t.app, get("/api/v1/auth/me", Some(&user_token))).await;
    let user_id = me["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &t.app,
        post_json(
            "/api/v1/admin/credits",
            Some(&user_token),
            json!({"user_id": user_id, "amount": 100}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Promote to admin directly in the store, then grant.
    let uid: uuid::Uuid = user_id.parse().unwrap();
    t.state
        .store
        .user_update(uid, |u| u.role = qto_core::UserRole::Admin)
        .unwrap();
    let (status, body) = send(
        &t.app,
        post_json(
            "/api/v1/admin/credits",
            Some(&user_token),
            json!({"user_id": user_id, "amount": 100}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 1100);
}
