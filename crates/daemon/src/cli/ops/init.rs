use clap::Args;

use fleet_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Port for the API server
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Seconds between health sweeps
    #[arg(long)]
    pub poll_interval: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::default();
        if let Some(port) = self.api_port {
            config.api_port = port;
        }
        if let Some(interval) = self.poll_interval {
            config.poller.interval_secs = interval;
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        Ok(format!(
            "Initialized fleet directory at {}\n  config: {}\n  key:    {}\n  nodes:  {}",
            state.fleet_dir.display(),
            state.config_path.display(),
            state.key_path.display(),
            state.nodes_path.display(),
        ))
    }
}
