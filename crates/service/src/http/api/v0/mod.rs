use axum::routing::{get, post};
use axum::Router;

pub mod events;
pub mod nodes;
pub mod poll;

use crate::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route("/events", get(events::handler))
        .route("/poll", post(poll::handler))
        .route("/nodes", get(nodes::list_handler))
        .route("/nodes/:node_id/status", get(nodes::status_handler))
        .route("/nodes/:node_id/reconcile", post(nodes::reconcile_handler))
        .route(
            "/nodes/:node_id/tunnels/:tunnel_id/config",
            get(nodes::tunnel_config_handler),
        )
        .route(
            "/nodes/:node_id/tunnels/:tunnel_id/qr",
            get(nodes::tunnel_qr_handler),
        )
}
