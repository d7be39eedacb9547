use reqwest::StatusCode;

use common::crypto::CipherError;

#[derive(Debug, thiserror::Error)]
pub enum NodeApiError {
    #[error("failed to decrypt node credential: {0}")]
    Credential(#[from] CipherError),
    #[error("invalid TLS material for node: {0}")]
    Tls(String),
    #[error("invalid node endpoint: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid path segment: {0:?}")]
    InvalidPath(String),
    #[error("request to node {node_id} failed: {source}")]
    Transport {
        node_id: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("node {node_id} responded with HTTP {status}: {body}")]
    Status {
        node_id: String,
        status: StatusCode,
        body: String,
    },
    #[error("failed to decode response from node {node_id}: {reason}")]
    Decode { node_id: String, reason: String },
    #[error("unexpected response content, expected {expected}")]
    UnexpectedContent { expected: &'static str },
}

impl NodeApiError {
    /// Status code returned by the node itself, if the call got that far
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            NodeApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the node could not be reached at all (timeout, refused, TLS handshake)
    pub fn is_unreachable(&self) -> bool {
        matches!(self, NodeApiError::Transport { .. })
    }
}
