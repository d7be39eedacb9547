use axum::body::Body;
use axum::extract::{Json, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use common::node::{NodeRecord, NodeSummary};

use crate::node_client::{NodeApiError, RawBody};
use crate::node_store::NodeStoreError;
use crate::ServiceState;

#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    /// Only list nodes belonging to this organization
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    pub nodes: Vec<NodeSummary>,
}

pub async fn list_handler(
    State(state): State<ServiceState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, NodeRouteError> {
    let nodes = state
        .node_store()
        .list_nodes()
        .await?
        .into_iter()
        .filter(|node| {
            query
                .organization_id
                .as_deref()
                .map_or(true, |org| node.organization_id == org)
        })
        .map(|node| node.summary())
        .collect();

    Ok((StatusCode::OK, Json(ListResponse { nodes })))
}

pub async fn status_handler(
    State(state): State<ServiceState>,
    Path(node_id): Path<String>,
) -> Result<impl IntoResponse, NodeRouteError> {
    let node = find(&state, &node_id).await?;
    let status = state.node_client().status(&node).await?;
    Ok((StatusCode::OK, Json(status)))
}

pub async fn reconcile_handler(
    State(state): State<ServiceState>,
    Path(node_id): Path<String>,
) -> Result<impl IntoResponse, NodeRouteError> {
    let node = find(&state, &node_id).await?;
    tracing::info!(node_id = %node.id, "reconciliation requested");
    let result = state.node_client().reconcile(&node).await?;
    Ok((StatusCode::OK, Json(result)))
}

pub async fn tunnel_config_handler(
    State(state): State<ServiceState>,
    Path((node_id, tunnel_id)): Path<(String, String)>,
) -> Result<Response, NodeRouteError> {
    let node = find(&state, &node_id).await?;
    let raw = state.node_client().tunnel_config(&node, &tunnel_id).await?;
    Ok(pass_through(raw))
}

pub async fn tunnel_qr_handler(
    State(state): State<ServiceState>,
    Path((node_id, tunnel_id)): Path<(String, String)>,
) -> Result<Response, NodeRouteError> {
    let node = find(&state, &node_id).await?;
    let raw = state.node_client().tunnel_qr(&node, &tunnel_id).await?;
    Ok(pass_through(raw))
}

async fn find(state: &ServiceState, node_id: &str) -> Result<NodeRecord, NodeRouteError> {
    Ok(state.node_store().get_node(node_id).await?)
}

/// Relay a non-JSON node body byte for byte
fn pass_through(raw: RawBody) -> Response {
    let content_type = raw
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(raw.body),
    )
        .into_response()
}

#[derive(Debug, thiserror::Error)]
pub enum NodeRouteError {
    #[error(transparent)]
    Store(#[from] NodeStoreError),
    #[error(transparent)]
    Node(#[from] NodeApiError),
}

impl IntoResponse for NodeRouteError {
    fn into_response(self) -> Response {
        match self {
            NodeRouteError::Store(NodeStoreError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "node not found", "node_id": id})),
            )
                .into_response(),
            NodeRouteError::Store(e) => {
                tracing::error!("node store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "unknown server error").into_response()
            }
            NodeRouteError::Node(e) => node_error_response(e),
        }
    }
}

fn node_error_response(err: NodeApiError) -> Response {
    match &err {
        NodeApiError::Status { status, body, .. } => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({
                "error": err.to_string(),
                "upstream_status": status.as_u16(),
                "upstream_body": body,
            })),
        )
            .into_response(),
        NodeApiError::InvalidPath(_) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response(),
        NodeApiError::Transport { source, .. } if source.is_timeout() => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response(),
        NodeApiError::Credential(_) | NodeApiError::Tls(_) | NodeApiError::Url(_) => {
            // never echo credential details back to the caller
            tracing::error!("node credentials unusable: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "node credentials are misconfigured"})),
            )
                .into_response()
        }
        _ => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response(),
    }
}
