use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

/// Last known reachability of a node, as observed by the health poller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectivityState::Online => "online",
            ConnectivityState::Offline => "offline",
            ConnectivityState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A VPS node reachable over its mTLS control-plane API
///
/// The client key is only ever held as an encrypted envelope. It is decrypted
/// by the node client for the duration of a single call and must not leave
/// that boundary; use [`NodeRecord::summary`] for anything outward facing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub organization_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Root of the node API, e.g. `https://203.0.113.7:8443`
    pub base_url: Url,
    /// Client certificate presented to the node (PEM)
    pub client_cert_pem: String,
    /// Client private key, encrypted (see [`crate::crypto`])
    pub client_key_envelope: String,
    /// CA that signed the node's server certificate (PEM)
    pub server_ca_pem: String,
    #[serde(default)]
    pub status: ConnectivityState,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_seen_at: Option<OffsetDateTime>,
}

impl NodeRecord {
    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.id.clone(),
            organization_id: self.organization_id.clone(),
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            status: self.status,
            last_seen_at: self.last_seen_at,
        }
    }
}

/// Outward facing view of a node, free of any credential material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: String,
    pub organization_id: String,
    pub name: Option<String>,
    pub base_url: Url,
    pub status: ConnectivityState,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen_at: Option<OffsetDateTime>,
}
