//! HTTP surface of the fleet service: status probes, the live event stream
//! and node proxy routes, all behind the admission controller.

use axum::middleware;
use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

pub mod api;
mod config;
mod handlers;
pub mod health;

pub use config::Config;
pub use handlers::not_found_handler;

use crate::rate_limit::rate_limit_middleware;
use crate::ServiceState;

pub const API_PREFIX: &str = "/api";
pub const STATUS_PREFIX: &str = "/_status";

/// Build the full API router
///
/// Every route, status probes included, passes through the rate limiter.
pub fn router(state: ServiceState) -> Router {
    Router::new()
        .nest(STATUS_PREFIX, health::router())
        .nest(API_PREFIX, api::router())
        .fallback(handlers::not_found_handler)
        .layer(middleware::from_fn_with_state(
            state.rate_limiter().clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

/// Run the API HTTP server until `shutdown_rx` fires
pub async fn run_api(
    config: Config,
    state: ServiceState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let listen_addr = config.listen_addr;
    let log_level = config.log_level;
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    let router = router(state).layer(trace_layer);

    tracing::info!(addr = ?listen_addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
