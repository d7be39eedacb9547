use clap::Args;

use fleet_daemon::state::{AppState, StateError};
use service::node_store::{InventoryError, NodeStore, NodeStoreError};
use service::{MemoryNodeStore, NodeApiError, NodeClient};

/// Query one node's status endpoint directly, bypassing the daemon
#[derive(Args, Debug, Clone)]
pub struct Probe {
    /// Node id as listed in nodes.toml
    pub node_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Store(#[from] NodeStoreError),

    #[error(transparent)]
    Node(#[from] NodeApiError),

    #[error("failed to render status: {0}")]
    Render(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Probe {
    type Error = ProbeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let key = state.load_key()?;
        let store = MemoryNodeStore::load(&state.nodes_path)?;
        let node = store.get_node(&self.node_id).await?;

        let client = NodeClient::new(key, state.config.node_client.clone());
        let status = client.status(&node).await?;

        Ok(serde_json::to_string_pretty(&status)?)
    }
}
