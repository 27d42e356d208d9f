//! HTTP surface: `/`, `/health` and `/aqi-info`.
//!
//! Handlers are stateless apart from [`AppState`], which wraps the
//! [`AqiPipeline`](crate::aqi::AqiPipeline) built at startup. Errors are
//! rendered by [`AppError`] as `{"error", "kind", "details"}`.

mod error;
mod handlers;
mod state;

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::{AppError, AppResult, ErrorKind};
pub use handlers::{HealthResponse, WelcomeResponse, WELCOME_MESSAGE};
pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/aqi-info", get(handlers::aqi_info))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl-C handler");
        // Without a handler, keep serving until the process is killed
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
