//! Ragline HTTP server
//!
//! Exposes the conversation orchestrator over HTTP:
//! - `GET /` health check
//! - `POST /api/process-prompt` single-shot turn
//! - `GET /api/stream-prompt` streamed turn as Server-Sent Events

mod error;
mod routes;
mod sanitize;
mod state;

pub use error::ApiError;
pub use sanitize::{clean_fragment, fragment_texts, FragmentError};
pub use state::AppState;

use anyhow::Result;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.context.config.server.frontend_origins);

    Router::new()
        .route("/", get(routes::health::health_check))
        .route("/api/process-prompt", post(routes::process::process_prompt))
        .route("/api/stream-prompt", get(routes::stream::stream_prompt))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    tracing::info!("Allowed origins: {:?}", origins);

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Bind `addr` and serve until Ctrl-C
pub async fn serve(state: Arc<AppState>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
