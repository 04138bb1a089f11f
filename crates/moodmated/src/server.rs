//! HTTP server setup and routing.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use moodmate_core::MusicLibrary;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::engine::EngineHandle;
use crate::handlers;

/// Shared application context passed to all handlers.
///
/// Built once at startup; nothing in it changes afterwards.
#[derive(Clone)]
pub struct AppContext {
    pub engine: EngineHandle,
    pub library: Arc<MusicLibrary>,
    /// Return internal error text on 500s instead of a generic message.
    pub expose_errors: bool,
    pub max_body_bytes: usize,
}

impl AppContext {
    pub fn new(engine: EngineHandle, library: MusicLibrary, config: &Config) -> Self {
        Self {
            engine,
            library: Arc::new(library),
            expose_errors: config.expose_errors,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

pub fn build_router(ctx: AppContext) -> Router {
    let body_limit = ctx.max_body_bytes;

    Router::new()
        .route("/", get(handlers::home))
        .route("/status", get(handlers::status))
        .route("/predict_emotion", post(handlers::predict_emotion))
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until Ctrl-C.
pub async fn run(config: &Config, ctx: AppContext) -> anyhow::Result<()> {
    let app = build_router(ctx);
    let addr = config.bind_addr();

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("moodmated shutting down");
}
