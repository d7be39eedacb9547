//! Typed wrappers, one per node capability

use reqwest::Method;
use serde_json::Value;

use common::node::NodeRecord;

use super::{NodeApiError, NodeClient, NodeResponse, RawBody, NODE_API_PREFIX};

/// Reject ids that would escape their path segment
fn segment(id: &str) -> Result<&str, NodeApiError> {
    if id.is_empty() || id.contains(['/', '?', '#', '%']) || id == "." || id == ".." {
        return Err(NodeApiError::InvalidPath(id.to_string()));
    }
    Ok(id)
}

impl NodeClient {
    async fn get_json(&self, node: &NodeRecord, path: &str) -> Result<Value, NodeApiError> {
        self.request(node, Method::GET, path, None)
            .await?
            .into_json()
    }

    async fn send_json(
        &self,
        node: &NodeRecord,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, NodeApiError> {
        self.request(node, method, path, body).await?.into_json()
    }

    // node

    pub async fn status(&self, node: &NodeRecord) -> Result<Value, NodeApiError> {
        self.get_json(node, &format!("{}/status", NODE_API_PREFIX))
            .await
    }

    pub async fn reconcile(&self, node: &NodeRecord) -> Result<Value, NodeApiError> {
        self.send_json(
            node,
            Method::POST,
            &format!("{}/reconcile", NODE_API_PREFIX),
            None,
        )
        .await
    }

    pub async fn server_pubkey(&self, node: &NodeRecord) -> Result<Value, NodeApiError> {
        self.get_json(node, &format!("{}/server/pubkey", NODE_API_PREFIX))
            .await
    }

    // tunnels

    pub async fn create_tunnel(
        &self,
        node: &NodeRecord,
        body: &Value,
    ) -> Result<Value, NodeApiError> {
        self.send_json(
            node,
            Method::POST,
            &format!("{}/tunnels", NODE_API_PREFIX),
            Some(body),
        )
        .await
    }

    pub async fn list_tunnels(&self, node: &NodeRecord) -> Result<Value, NodeApiError> {
        self.get_json(node, &format!("{}/tunnels", NODE_API_PREFIX))
            .await
    }

    pub async fn get_tunnel(
        &self,
        node: &NodeRecord,
        tunnel_id: &str,
    ) -> Result<Value, NodeApiError> {
        let path = format!("{}/tunnels/{}", NODE_API_PREFIX, segment(tunnel_id)?);
        self.get_json(node, &path).await
    }

    pub async fn delete_tunnel(
        &self,
        node: &NodeRecord,
        tunnel_id: &str,
    ) -> Result<NodeResponse, NodeApiError> {
        let path = format!("{}/tunnels/{}", NODE_API_PREFIX, segment(tunnel_id)?);
        self.request(node, Method::DELETE, &path, None).await
    }

    /// Client configuration file for a tunnel, returned byte for byte
    pub async fn tunnel_config(
        &self,
        node: &NodeRecord,
        tunnel_id: &str,
    ) -> Result<RawBody, NodeApiError> {
        let path = format!("{}/tunnels/{}/config", NODE_API_PREFIX, segment(tunnel_id)?);
        self.request(node, Method::GET, &path, None)
            .await?
            .into_raw()
    }

    /// QR code image of the tunnel configuration
    pub async fn tunnel_qr(
        &self,
        node: &NodeRecord,
        tunnel_id: &str,
    ) -> Result<RawBody, NodeApiError> {
        let path = format!("{}/tunnels/{}/qr", NODE_API_PREFIX, segment(tunnel_id)?);
        self.request(node, Method::GET, &path, None)
            .await?
            .into_raw()
    }

    pub async fn rotate_tunnel(
        &self,
        node: &NodeRecord,
        tunnel_id: &str,
    ) -> Result<Value, NodeApiError> {
        let path = format!("{}/tunnels/{}/rotate", NODE_API_PREFIX, segment(tunnel_id)?);
        self.send_json(node, Method::POST, &path, None).await
    }

    pub async fn get_rotation_policy(
        &self,
        node: &NodeRecord,
        tunnel_id: &str,
    ) -> Result<Value, NodeApiError> {
        let path = format!(
            "{}/tunnels/{}/rotation-policy",
            NODE_API_PREFIX,
            segment(tunnel_id)?
        );
        self.get_json(node, &path).await
    }

    pub async fn set_rotation_policy(
        &self,
        node: &NodeRecord,
        tunnel_id: &str,
        policy: &Value,
    ) -> Result<Value, NodeApiError> {
        let path = format!(
            "{}/tunnels/{}/rotation-policy",
            NODE_API_PREFIX,
            segment(tunnel_id)?
        );
        self.send_json(node, Method::PUT, &path, Some(policy)).await
    }

    // routes

    pub async fn create_route(
        &self,
        node: &NodeRecord,
        body: &Value,
    ) -> Result<Value, NodeApiError> {
        self.send_json(
            node,
            Method::POST,
            &format!("{}/routes", NODE_API_PREFIX),
            Some(body),
        )
        .await
    }

    pub async fn list_routes(&self, node: &NodeRecord) -> Result<Value, NodeApiError> {
        self.get_json(node, &format!("{}/routes", NODE_API_PREFIX))
            .await
    }

    pub async fn delete_route(
        &self,
        node: &NodeRecord,
        route_id: &str,
    ) -> Result<NodeResponse, NodeApiError> {
        let path = format!("{}/routes/{}", NODE_API_PREFIX, segment(route_id)?);
        self.request(node, Method::DELETE, &path, None).await
    }

    // firewall

    pub async fn create_firewall_rule(
        &self,
        node: &NodeRecord,
        body: &Value,
    ) -> Result<Value, NodeApiError> {
        self.send_json(
            node,
            Method::POST,
            &format!("{}/firewall/rules", NODE_API_PREFIX),
            Some(body),
        )
        .await
    }

    pub async fn list_firewall_rules(&self, node: &NodeRecord) -> Result<Value, NodeApiError> {
        self.get_json(node, &format!("{}/firewall/rules", NODE_API_PREFIX))
            .await
    }

    pub async fn delete_firewall_rule(
        &self,
        node: &NodeRecord,
        rule_id: &str,
    ) -> Result<NodeResponse, NodeApiError> {
        let path = format!("{}/firewall/rules/{}", NODE_API_PREFIX, segment(rule_id)?);
        self.request(node, Method::DELETE, &path, None).await
    }
}
