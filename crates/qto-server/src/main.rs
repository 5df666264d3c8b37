// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use qto_config::Settings;
use qto_core::SystemClock;
use qto_mail::TracingMailer;
use qto_server::{AppState, build_app};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "qto-server", version, about = "Take-off and estimating back-end")]
struct Args {
    /// Bind address; overrides BIND_ADDR.
    #[arg(long)]
    bind: Option<String>,

    /// Enable request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("qto=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("qto=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut settings = Settings::from_env().context("load settings")?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }

    let bind_addr = settings.bind_addr.clone();
    let storage = settings.storage_dir.clone();
    let state = AppState::build(settings, Arc::new(SystemClock), Arc::new(TracingMailer))
        .context("build application state")?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("bind {bind_addr}"))?;
    info!(bind = %bind_addr, storage = %storage.display(), "qto-server listening");

    // Connect info feeds peer addresses to the per-IP rate limiter.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("serve")
}
