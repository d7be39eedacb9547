use std::sync::Arc;

use super::config::Config;
use super::event_bus::EventBus;
use super::node_client::{NodeClient, NodeProbe};
use super::node_store::{InventoryError, MemoryNodeStore, NodeStore};
use super::poller::{HealthPoller, PollerConfig};
use super::rate_limit::{RateLimitConfig, RateLimitConfigError, RateLimiter};

/// Main service state - shared by every handler and background task
#[derive(Clone)]
pub struct State {
    store: Arc<dyn NodeStore>,
    client: NodeClient,
    bus: EventBus,
    poller: HealthPoller,
    rate_limiter: Arc<RateLimiter>,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("client", &self.client)
            .field("bus", &self.bus)
            .field("poller", &self.poller)
            .finish()
    }
}

impl State {
    pub fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Load the node inventory
        let store = match &config.nodes_path {
            Some(path) => MemoryNodeStore::load(path)?,
            None => {
                tracing::warn!("no node inventory configured, starting empty");
                MemoryNodeStore::default()
            }
        };

        // 2. Node client shares the credential key with nothing else
        let client = NodeClient::new(
            config.encryption_key.clone(),
            config.node_client.clone(),
        );

        Self::new(
            Arc::new(store),
            client,
            config.poller.clone(),
            config.rate_limit.clone(),
        )
    }

    /// Wire the components together around an arbitrary node store
    pub fn new(
        store: Arc<dyn NodeStore>,
        client: NodeClient,
        poller: PollerConfig,
        rate_limit: RateLimitConfig,
    ) -> Result<Self, StateSetupError> {
        let probe: Arc<dyn NodeProbe> = Arc::new(client.clone());
        Self::with_probe(store, client, probe, poller, rate_limit)
    }

    /// Like [`State::new`], with the health poller checking nodes through `probe`
    pub fn with_probe(
        store: Arc<dyn NodeStore>,
        client: NodeClient,
        probe: Arc<dyn NodeProbe>,
        poller: PollerConfig,
        rate_limit: RateLimitConfig,
    ) -> Result<Self, StateSetupError> {
        let bus = EventBus::new();
        let rate_limiter = Arc::new(RateLimiter::new(rate_limit)?);
        let poller = HealthPoller::new(store.clone(), probe, bus.clone(), poller);

        Ok(Self {
            store,
            client,
            bus,
            poller,
            rate_limiter,
        })
    }

    pub fn node_store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn node_client(&self) -> &NodeClient {
        &self.client
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn poller(&self) -> &HealthPoller {
        &self.poller
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to load node inventory: {0}")]
    Inventory(#[from] InventoryError),
    #[error("invalid rate limit configuration: {0}")]
    RateLimit(#[from] RateLimitConfigError),
}
