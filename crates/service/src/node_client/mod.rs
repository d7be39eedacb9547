//! mTLS client for the per-node control-plane API
//!
//! Every call decrypts the node's client key, builds a TLS configuration that
//! presents the node's client certificate and trusts only the node's own CA,
//! issues exactly one request and then drops all of it. Nothing is cached
//! between calls, so the client is freely shareable across tasks.

mod error;
mod ops;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use reqwest::{Certificate, Client, Identity, Method};
use serde::{Deserialize, Serialize};
use url::Url;

use common::crypto::EncryptionKey;
use common::node::NodeRecord;

pub use error::NodeApiError;

/// Version prefix of every node API path
pub const NODE_API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeClientConfig {
    /// Overall deadline for a single node call, in seconds
    pub request_timeout_secs: u64,
    /// Deadline for establishing the TCP + TLS connection, in seconds
    pub connect_timeout_secs: u64,
}

impl Default for NodeClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
        }
    }
}

/// A non-JSON response body, passed through untouched
#[derive(Debug, Clone, PartialEq)]
pub struct RawBody {
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Result of a successful node call
#[derive(Debug, Clone, PartialEq)]
pub enum NodeResponse {
    /// The node answered with `application/json` (or a `+json` type)
    Json(serde_json::Value),
    /// Anything else: config files, QR images, empty bodies
    Raw(RawBody),
}

impl NodeResponse {
    pub fn into_json(self) -> Result<serde_json::Value, NodeApiError> {
        match self {
            NodeResponse::Json(value) => Ok(value),
            NodeResponse::Raw(_) => Err(NodeApiError::UnexpectedContent { expected: "json" }),
        }
    }

    pub fn into_raw(self) -> Result<RawBody, NodeApiError> {
        match self {
            NodeResponse::Raw(raw) => Ok(raw),
            NodeResponse::Json(_) => Err(NodeApiError::UnexpectedContent { expected: "raw" }),
        }
    }
}

#[derive(Clone)]
pub struct NodeClient {
    key: EncryptionKey,
    config: NodeClientConfig,
}

impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClient")
            .field("config", &self.config)
            .finish()
    }
}

impl NodeClient {
    pub fn new(key: EncryptionKey, config: NodeClientConfig) -> Self {
        Self { key, config }
    }

    /// Issue one authenticated request against `node`
    ///
    /// `endpoint` is appended verbatim to the node's base URL. Non-2xx answers
    /// become [`NodeApiError::Status`] carrying the node's body as-is.
    pub async fn request(
        &self,
        node: &NodeRecord,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<NodeResponse, NodeApiError> {
        let url = endpoint_url(&node.base_url, endpoint)?;
        let client = self.connect(node)?;

        tracing::debug!(node_id = %node.id, %method, %endpoint, "calling node API");

        let mut request = client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| NodeApiError::Transport {
                node_id: node.id.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let raw = response
                .bytes()
                .await
                .map_err(|source| NodeApiError::Transport {
                    node_id: node.id.clone(),
                    source,
                })?;
            let body = String::from_utf8_lossy(&raw).into_owned();
            tracing::warn!(
                node_id = %node.id,
                %method,
                %endpoint,
                status = status.as_u16(),
                "node API returned an error"
            );
            return Err(NodeApiError::Status {
                node_id: node.id.clone(),
                status,
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|source| NodeApiError::Transport {
                node_id: node.id.clone(),
                source,
            })?;

        classify(&node.id, content_type, body)
    }

    /// Build a single-use client bound to this node's credentials
    ///
    /// The decrypted key only lives for the duration of this function.
    fn connect(&self, node: &NodeRecord) -> Result<Client, NodeApiError> {
        let key_pem = self.key.decrypt(&node.client_key_envelope)?;

        let mut identity_pem =
            Vec::with_capacity(node.client_cert_pem.len() + key_pem.len() + 1);
        identity_pem.extend_from_slice(node.client_cert_pem.as_bytes());
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(key_pem.as_bytes());
        drop(key_pem);

        let identity = Identity::from_pem(&identity_pem)
            .map_err(|e| NodeApiError::Tls(format!("client identity rejected: {}", e)))?;
        let server_ca = Certificate::from_pem(node.server_ca_pem.as_bytes())
            .map_err(|e| NodeApiError::Tls(format!("server CA rejected: {}", e)))?;

        Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(server_ca)
            .identity(identity)
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .build()
            .map_err(|e| NodeApiError::Tls(format!("failed to build client: {}", e)))
    }
}

/// Seam between the health poller and the node API
#[async_trait]
pub trait NodeProbe: Send + Sync {
    /// Query the node's status endpoint
    async fn probe(&self, node: &NodeRecord) -> Result<serde_json::Value, NodeApiError>;
}

#[async_trait]
impl NodeProbe for NodeClient {
    async fn probe(&self, node: &NodeRecord) -> Result<serde_json::Value, NodeApiError> {
        self.status(node).await
    }
}

fn endpoint_url(base_url: &Url, endpoint: &str) -> Result<Url, NodeApiError> {
    let base = base_url.as_str().trim_end_matches('/');
    Ok(Url::parse(&format!("{}{}", base, endpoint))?)
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

fn classify(
    node_id: &str,
    content_type: Option<String>,
    body: Bytes,
) -> Result<NodeResponse, NodeApiError> {
    match content_type {
        Some(ct) if is_json(&ct) => {
            if body.is_empty() {
                return Ok(NodeResponse::Json(serde_json::Value::Null));
            }
            serde_json::from_slice(&body)
                .map(NodeResponse::Json)
                .map_err(|e| NodeApiError::Decode {
                    node_id: node_id.to_string(),
                    reason: e.to_string(),
                })
        }
        content_type => Ok(NodeResponse::Raw(RawBody { content_type, body })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::node::ConnectivityState;

    fn node_with_envelope(envelope: &str) -> NodeRecord {
        NodeRecord {
            id: "node-1".into(),
            organization_id: "org-1".into(),
            name: None,
            base_url: Url::parse("https://127.0.0.1:9").unwrap(),
            client_cert_pem: String::new(),
            client_key_envelope: envelope.into(),
            server_ca_pem: String::new(),
            status: ConnectivityState::Unknown,
            last_seen_at: None,
        }
    }

    #[test]
    fn test_json_detection() {
        assert!(is_json("application/json"));
        assert!(is_json("application/json; charset=utf-8"));
        assert!(is_json("Application/JSON"));
        assert!(is_json("application/problem+json"));
        assert!(!is_json("image/png"));
        assert!(!is_json("text/plain"));
    }

    #[test]
    fn test_classify_passes_binary_through() {
        let png = Bytes::from_static(&[0x89, b'P', b'N', b'G']);
        let response = classify("n", Some("image/png".into()), png.clone()).unwrap();
        assert_eq!(
            response,
            NodeResponse::Raw(RawBody {
                content_type: Some("image/png".into()),
                body: png,
            })
        );

        let response = classify("n", None, Bytes::new()).unwrap();
        assert!(matches!(response, NodeResponse::Raw(_)));
    }

    #[test]
    fn test_classify_json_and_bad_json() {
        let response = classify(
            "n",
            Some("application/json".into()),
            Bytes::from_static(br#"{"ok":true}"#),
        )
        .unwrap();
        assert_eq!(response.into_json().unwrap()["ok"], true);

        let err = classify("n", Some("application/json".into()), Bytes::from_static(b"{"))
            .unwrap_err();
        assert!(matches!(err, NodeApiError::Decode { .. }));
    }

    #[test]
    fn test_endpoint_url_joins_base() {
        let base = Url::parse("https://10.0.0.1:8443/").unwrap();
        let url = endpoint_url(&base, "/api/v1/status").unwrap();
        assert_eq!(url.as_str(), "https://10.0.0.1:8443/api/v1/status");

        let base = Url::parse("https://node.example.com/control").unwrap();
        let url = endpoint_url(&base, "/api/v1/routes").unwrap();
        assert_eq!(url.as_str(), "https://node.example.com/control/api/v1/routes");
    }

    #[tokio::test]
    async fn test_bad_envelope_fails_before_any_network_io() {
        let key = EncryptionKey::generate().unwrap();
        let client = NodeClient::new(key, NodeClientConfig::default());

        let err = client
            .status(&node_with_envelope("definitely not an envelope"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeApiError::Credential(_)));
    }

    #[tokio::test]
    async fn test_wrong_key_is_a_credential_error() {
        let envelope = EncryptionKey::generate().unwrap().encrypt("KEY").unwrap();
        let client = NodeClient::new(
            EncryptionKey::generate().unwrap(),
            NodeClientConfig::default(),
        );

        let err = client
            .status(&node_with_envelope(&envelope))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeApiError::Credential(_)));
    }

    #[tokio::test]
    async fn test_garbage_identity_is_a_tls_error() {
        let key = EncryptionKey::generate().unwrap();
        let envelope = key.encrypt("not a pem key").unwrap();
        let client = NodeClient::new(key, NodeClientConfig::default());

        let err = client
            .status(&node_with_envelope(&envelope))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeApiError::Tls(_)));
    }
}
