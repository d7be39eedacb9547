//! Fleet connectivity core: everything the dashboard backend runs in-process.
//!
//! - Node API client (mutual TLS, credentials decrypted on demand)
//! - Health poller (edge-triggered status events)
//! - Event bus (organization-scoped fan-out to live viewers)
//! - Admission controller (per-client token buckets)
//! - HTTP surface tying the above together

pub mod config;
pub mod event_bus;
pub mod http;
pub mod node_client;
pub mod node_store;
pub mod poller;
pub mod process;
pub mod rate_limit;
pub mod state;

// Re-export key types for convenience
pub use config::Config as ServiceConfig;
pub use event_bus::{DeliveryError, EventBus, Subscription};
pub use node_client::{NodeApiError, NodeClient, NodeClientConfig, NodeProbe, NodeResponse, RawBody};
pub use node_store::{MemoryNodeStore, NodeStore, NodeStoreError};
pub use poller::{HealthPoller, PollerConfig, Sweep, SweepSummary};
pub use rate_limit::{Admission, RateLimitConfig, RateLimiter};
pub use state::{State as ServiceState, StateSetupError};
