use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use common::crypto::EncryptionKey;

use crate::node_client::NodeClientConfig;
use crate::poller::PollerConfig;
use crate::rate_limit::RateLimitConfig;

#[derive(Debug)]
pub struct Config {
    // http server configuration
    /// address for the API server to listen on.
    ///  if not set then 0.0.0.0:3000 will be used
    pub api_listen_addr: Option<SocketAddr>,

    // credentials
    /// key used to open the private key envelope of every node
    pub encryption_key: EncryptionKey,

    // node inventory
    /// path to a `nodes.toml` inventory, if not set then
    ///  the service starts with no nodes
    pub nodes_path: Option<PathBuf>,

    // background work
    pub poller: PollerConfig,
    pub rate_limit: RateLimitConfig,
    pub node_client: NodeClientConfig,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn new(encryption_key: EncryptionKey) -> Self {
        Self {
            api_listen_addr: Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 3000)),
            encryption_key,
            nodes_path: None,
            poller: PollerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            node_client: NodeClientConfig::default(),
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.api_listen_addr
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 3000))
    }
}
