// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP surface of the qto back-end.
//!
//! [`AppState`] wires the domain services from settings; [`build_app`]
//! assembles the `/api/v1` router. Handlers translate between HTTP and
//! the domain — every decision (authorization, validation, concurrency)
//! lives in the service crates.

#![deny(unsafe_code)]

pub mod auth_extract;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod sse;

use axum::Router;
use axum::routing::{get, post};
use qto_auth::{AuthConfig, AuthService};
use qto_boq::BoqEditor;
use qto_broker::Broker;
use qto_collab::CollabService;
use qto_config::Settings;
use qto_core::{Clock, SystemClock};
use qto_engine::{Engine, JobQueue, TokioJobQueue};
use qto_export::Exporter;
use qto_extract::{ExtractorSet, MappingConfig};
use qto_mail::{Mailer, TracingMailer};
use qto_presign::Presigner;
use qto_store::Store;
use std::sync::Arc;

/// Everything a handler can reach.
pub struct AppState {
    /// Deployment settings.
    pub settings: Settings,
    /// Persistent state.
    pub store: Store,
    /// In-process event fan-out.
    pub broker: Broker,
    /// Accounts and tokens.
    pub auth: AuthService,
    /// Collaboration.
    pub collab: CollabService,
    /// Job lifecycle.
    pub engine: Arc<Engine>,
    /// Background submission seam.
    pub queue: Arc<dyn JobQueue>,
    /// BoQ editing.
    pub editor: BoqEditor,
    /// Artifact rendering and downloads.
    pub exporter: Exporter,
    /// Presigned-URL minting for uploads.
    pub presigner: Arc<Presigner>,
}

impl AppState {
    /// Wire the full state from settings, with explicit clock and mailer
    /// so tests stay deterministic.
    pub fn build(
        settings: Settings,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Arc<Self>> {
        std::fs::create_dir_all(settings.uploads_dir())?;
        std::fs::create_dir_all(settings.artifacts_dir())?;
        std::fs::create_dir_all(settings.config_dir())?;

        let store = Store::open(&settings.state_dir(), clock.clone())
            .map_err(|e| anyhow::anyhow!("open store: {e}"))?;
        let broker = Broker::new();
        let presigner = Arc::new(
            Presigner::new(
                settings.secret_key.as_bytes(),
                settings.presign_default_ttl_secs,
                settings.presign_clock_skew_secs,
                clock.clone(),
            )
            .map_err(|e| anyhow::anyhow!("presigner: {e}"))?,
        );

        let mapping = MappingConfig::load_or_default(&settings.config_dir())
            .map_err(|e| anyhow::anyhow!("mapping config: {e}"))?;
        let engine = Arc::new(Engine::new(
            store.clone(),
            Arc::new(broker.clone()),
            ExtractorSet::defaults(),
            mapping,
            settings.uploads_dir(),
            settings.cost_per_job,
        ));
        let queue: Arc<dyn JobQueue> = Arc::new(TokioJobQueue::new(engine.clone()));

        let auth = AuthService::new(
            store.clone(),
            mailer.clone(),
            clock.clone(),
            AuthConfig {
                secret: settings.secret_key.as_bytes().to_vec(),
                token_ttl_secs: settings.access_token_ttl_secs,
                resend_cooldown_secs: settings.resend_cooldown_secs,
                signup_credits: settings.signup_credits,
                pbkdf2_iterations: settings.pbkdf2_iterations,
            },
        );
        let collab = CollabService::new(
            store.clone(),
            Arc::new(broker.clone()),
            mailer,
            clock.clone(),
            settings.invitation_expiry_days,
        );
        let editor = BoqEditor::new(store.clone(), Arc::new(broker.clone()));
        let exporter = Exporter::new(
            store.clone(),
            Arc::new(broker.clone()),
            presigner.clone(),
            settings.artifacts_dir(),
        );

        Ok(Arc::new(Self {
            settings,
            store,
            broker,
            auth,
            collab,
            engine,
            queue,
            editor,
            exporter,
            presigner,
        }))
    }

    /// State for handler tests: temp storage, system clock, tracing
    /// mailer.
    pub fn for_tests(storage_dir: &std::path::Path) -> Arc<Self> {
        let settings = Settings::for_tests(storage_dir);
        Self::build(settings, Arc::new(SystemClock), Arc::new(TracingMailer))
            .expect("test state builds")
    }
}

/// Assemble the `/api/v1` router.
///
/// The rate limiter wraps the API surface only; `/health` stays
/// unlimited so probes cannot starve themselves out.
pub fn build_app(state: Arc<AppState>) -> Router {
    let max_upload = state.settings.max_upload_bytes as usize;
    let limiter = middleware::RateLimiter::new(
        state.settings.rate_limit_max_requests,
        std::time::Duration::from_secs(state.settings.rate_limit_window_secs),
    );

    let api = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/verify-email", post(routes::auth::verify_email))
        .route(
            "/auth/resend-verification",
            post(routes::auth::resend_verification),
        )
        .route("/auth/complete-invite", post(routes::auth::complete_invite))
        .route("/auth/me", get(routes::auth::me))
        .route(
            "/projects",
            get(routes::projects::list).post(routes::projects::create),
        )
        .route(
            "/projects/{id}",
            get(routes::projects::get_one).delete(routes::projects::delete),
        )
        .route(
            "/projects/{id}/collaborators",
            get(routes::collab::list_collaborators).post(routes::collab::add_collaborator),
        )
        .route(
            "/projects/{id}/collaborators/{collaborator_id}",
            axum::routing::patch(routes::collab::change_role)
                .delete(routes::collab::remove_collaborator),
        )
        .route(
            "/projects/{id}/invitations",
            get(routes::collab::list_invitations).post(routes::collab::invite),
        )
        .route(
            "/projects/{id}/invitations/{invitation_id}",
            axum::routing::delete(routes::collab::revoke_invitation),
        )
        .route("/invitations/accept", post(routes::collab::accept_invitation))
        .route(
            "/projects/{id}/comments",
            get(routes::collab::list_comments).post(routes::collab::add_comment),
        )
        .route("/projects/{id}/activity", get(routes::collab::list_activities))
        .route("/notifications", get(routes::collab::list_notifications))
        .route(
            "/notifications/{id}/read",
            post(routes::collab::mark_notification_read),
        )
        .route("/files", post(routes::files::create_presigned_upload))
        .route(
            "/files/{id}/content",
            axum::routing::put(routes::files::upload_content)
                .layer(axum::extract::DefaultBodyLimit::max(max_upload + 4096)),
        )
        .route("/files/{id}", get(routes::files::get_file))
        .route("/jobs", get(routes::jobs::list).post(routes::jobs::create))
        .route("/jobs/{id}", get(routes::jobs::get_one))
        .route("/jobs/{id}/cancel", post(routes::jobs::cancel))
        .route("/jobs/{id}/events", get(routes::jobs::events))
        .route("/jobs/{id}/stream", get(routes::jobs::stream))
        .route("/jobs/{id}/exports/stream", get(routes::exports::stream))
        .route("/jobs/{id}/boq", get(routes::boq::list))
        .route("/jobs/{id}/boq/validate", get(routes::boq::validate))
        .route("/boq/items/{id}", axum::routing::patch(routes::boq::update_item))
        .route("/boq/items/bulk", post(routes::boq::bulk_update))
        .route("/jobs/{id}/export", post(routes::exports::export))
        .route("/jobs/{id}/artifacts", get(routes::exports::list_artifacts))
        .route("/artifacts/{id}/presign", post(routes::exports::presign))
        .route("/artifacts/{id}/download", get(routes::exports::download))
        .route(
            "/templates",
            get(routes::templates::list_templates).post(routes::templates::create_template),
        )
        .route(
            "/templates/{id}",
            axum::routing::delete(routes::templates::delete_template),
        )
        .route("/jobs/{id}/estimates", post(routes::templates::create_estimate))
        .route(
            "/projects/{id}/estimates",
            get(routes::templates::list_estimates),
        )
        .route("/admin/credits", post(routes::admin::grant_credits))
        .with_state(state)
        .layer(limiter.into_layer());

    Router::new()
        .route("/health", get(routes::health))
        .nest("/api/v1", api)
        .layer(axum::middleware::from_fn(middleware::request_logger))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(middleware::cors())
}
