use clap::Args;

use fleet_daemon::client::ApiError;

/// Ask the running daemon for an immediate health sweep
#[derive(Args, Debug, Clone)]
pub struct Poll;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("poll request failed: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Poll {
    type Error = PollError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let result = ctx.client.trigger_poll().await?;

        let output = match result["result"].as_str() {
            Some("skipped") => "sweep already in progress, skipped".to_string(),
            _ => format!(
                "checked {} nodes: {} online, {} offline, {} changed",
                result["checked"], result["online"], result["offline"], result["transitions"]
            ),
        };
        Ok(output)
    }
}
