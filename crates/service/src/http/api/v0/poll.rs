use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::poller::{PollError, Sweep, SweepSummary};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PollResponse {
    Skipped,
    Completed(SweepSummary),
}

/// Run a sweep now instead of waiting for the next tick
pub async fn handler(State(state): State<ServiceState>) -> Result<impl IntoResponse, PollRouteError> {
    let response = match state.poller().poll().await? {
        Sweep::Skipped => PollResponse::Skipped,
        Sweep::Completed(summary) => PollResponse::Completed(summary),
    };
    Ok((StatusCode::OK, Json(response)))
}

#[derive(Debug, thiserror::Error)]
pub enum PollRouteError {
    #[error(transparent)]
    Poll(#[from] PollError),
}

impl IntoResponse for PollRouteError {
    fn into_response(self) -> Response {
        tracing::error!("manual sweep failed: {}", self);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": self.to_string()})),
        )
            .into_response()
    }
}
