use std::sync::Arc;

use async_trait::async_trait;

use crate::node_store::NodeStore;

#[async_trait]
pub trait DataSource {
    /// Perform various checks on the system to ensure its healthy and ready to accept requests.
    async fn is_ready(&self) -> Result<(), DataSourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("one or more dependent services aren't available")]
    DependencyFailure,
}

/// Ready once the node store answers a listing
pub struct StoreReadiness(Arc<dyn NodeStore>);

impl StoreReadiness {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self(store)
    }
}

#[async_trait]
impl DataSource for StoreReadiness {
    async fn is_ready(&self) -> Result<(), DataSourceError> {
        self.0.list_nodes().await.map_err(|e| {
            tracing::warn!("node store not ready: {}", e);
            DataSourceError::DependencyFailure
        })?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Clone)]
    pub(crate) enum MockReadiness {
        DependencyFailure,
        Ready,
    }

    #[async_trait]
    impl DataSource for MockReadiness {
        async fn is_ready(&self) -> Result<(), DataSourceError> {
            use MockReadiness::*;

            match self {
                DependencyFailure => Err(DataSourceError::DependencyFailure),
                Ready => Ok(()),
            }
        }
    }
}
