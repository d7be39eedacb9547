//! Live events pushed to connected dashboard viewers
//!
//! Events are immutable, fire-and-forget facts. Nothing here is persisted; a
//! viewer that is not connected when an event fires never sees it.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::node::ConnectivityState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    NodeStatusChanged {
        node_id: String,
        organization_id: String,
        status: ConnectivityState,
        previous: ConnectivityState,
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
    },
    TunnelConnected {
        node_id: String,
        tunnel_id: String,
    },
    TunnelDisconnected {
        node_id: String,
        tunnel_id: String,
    },
    RouteAdded {
        node_id: String,
        route_id: String,
    },
    RouteRemoved {
        node_id: String,
        route_id: String,
    },
    RotationPending {
        node_id: String,
        tunnel_id: String,
    },
    RotationRevoked {
        node_id: String,
        tunnel_id: String,
    },
    ReconciliationDrift {
        node_id: String,
        details: serde_json::Value,
    },
}

impl FleetEvent {
    /// Wire name of the variant, matches the serialized `type` tag
    pub fn name(&self) -> &'static str {
        match self {
            FleetEvent::NodeStatusChanged { .. } => "node_status_changed",
            FleetEvent::TunnelConnected { .. } => "tunnel_connected",
            FleetEvent::TunnelDisconnected { .. } => "tunnel_disconnected",
            FleetEvent::RouteAdded { .. } => "route_added",
            FleetEvent::RouteRemoved { .. } => "route_removed",
            FleetEvent::RotationPending { .. } => "rotation_pending",
            FleetEvent::RotationRevoked { .. } => "rotation_revoked",
            FleetEvent::ReconciliationDrift { .. } => "reconciliation_drift",
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            FleetEvent::NodeStatusChanged { node_id, .. }
            | FleetEvent::TunnelConnected { node_id, .. }
            | FleetEvent::TunnelDisconnected { node_id, .. }
            | FleetEvent::RouteAdded { node_id, .. }
            | FleetEvent::RouteRemoved { node_id, .. }
            | FleetEvent::RotationPending { node_id, .. }
            | FleetEvent::RotationRevoked { node_id, .. }
            | FleetEvent::ReconciliationDrift { node_id, .. } => node_id,
        }
    }
}
