//! Router assembly and process lifecycle.

use crate::routes::{generate, health, images, load, models, not_found, save};
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use nodeflow_core::config::Config;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Build the router with every endpoint and the shared middleware stack.
///
/// Generated images travel as base64 inside JSON bodies, so the body limit
/// comes from configuration rather than axum's 2MB default.
pub fn build_router(state: AppState) -> Router {
    let settings = &state.config.server;
    let body_limit = settings.max_body_size_mb * 1024 * 1024;
    let timeout = Duration::from_secs(settings.request_timeout_secs);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/generate", post(generate::generate))
        .route("/api/save-generation", post(save::save_generation))
        .route("/api/load-generation", post(load::load_generation))
        .route("/api/models/{*model_id}", get(models::model_schema))
        .route("/api/images/{id}", get(images::hosted_image))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

pub async fn start_server(config: Config) -> Result<()> {
    let addr = (config.server.bind_addr.clone(), config.server.port);
    tracing::info!(
        bind_addr = %addr.0,
        port = addr.1,
        timeout_secs = config.server.request_timeout_secs,
        max_body_mb = config.server.max_body_size_mb,
        gemini_model = config.gemini_model(),
        "starting nodeflow server"
    );

    let state = AppState::new(config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind((addr.0.as_str(), addr.1))
        .await
        .with_context(|| format!("bind {}:{}", addr.0, addr.1))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
