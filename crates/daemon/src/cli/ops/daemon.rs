use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Args;

use fleet_daemon::state::AppState;
use fleet_daemon::{spawn_service, ServiceConfig};
use service::process::ServiceError;

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override API server port (default from config)
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    StateError(#[from] fleet_daemon::state::StateError),

    #[error("daemon failed: {0}")]
    Failed(#[from] ServiceError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        // Load state from config path (or default ~/.fleet)
        let state = AppState::load(ctx.config_path.clone())?;
        let encryption_key = state.load_key()?;

        let api_port = self.api_port.unwrap_or(state.config.api_port);

        let mut config = ServiceConfig::new(encryption_key);
        config.api_listen_addr = Some(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            api_port,
        ));
        config.nodes_path = Some(state.nodes_path.clone());
        config.poller = state.config.poller.clone();
        config.rate_limit = state.config.rate_limit.clone();
        config.node_client = state.config.node_client.clone();
        config.log_dir = self.log_dir.clone().or_else(|| state.config.log_dir.clone());

        spawn_service(&config).await?;
        Ok("daemon ended".to_string())
    }
}
