use std::convert::Infallible;

use clap::Args;

use fleet_daemon::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = Infallible;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        // 1. Check config directory
        lines.push("Config:".to_string());
        match AppState::load(ctx.config_path.clone()) {
            Ok(state) => {
                lines.push(format!("  directory:    {}", state.fleet_dir.display()));
                lines.push("  config.toml:  OK".to_string());
                match state.load_key() {
                    Ok(_) => lines.push("  key:          OK".to_string()),
                    Err(e) => lines.push(format!("  key:          INVALID ({})", e)),
                }
                match service::MemoryNodeStore::load(&state.nodes_path) {
                    Ok(store) => lines.push(format!("  nodes.toml:   {} nodes", store.len())),
                    Err(e) => lines.push(format!("  nodes.toml:   INVALID ({})", e)),
                }
                lines.push(format!("  api_port:     {}", state.config.api_port));
            }
            Err(e) => {
                lines.push(format!("  error: {}", e));
            }
        }

        // 2. Check daemon liveness
        let base = ctx.client.base_url();
        let client = ctx.client.http_client();

        lines.push(String::new());
        lines.push(format!("Daemon ({}):", base));

        let livez_url = format!("{}/_status/livez", base.as_str().trim_end_matches('/'));
        match client.get(&livez_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                lines.push("  livez:  OK".to_string());
            }
            Ok(resp) => {
                lines.push(format!("  livez:  UNHEALTHY ({})", resp.status()));
            }
            Err(_) => {
                lines.push("  livez:  NOT REACHABLE".to_string());
            }
        }

        // 3. Check daemon readiness
        let readyz_url = format!("{}/_status/readyz", base.as_str().trim_end_matches('/'));
        match client.get(&readyz_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                lines.push("  readyz: OK".to_string());
            }
            Ok(resp) => {
                lines.push(format!("  readyz: UNHEALTHY ({})", resp.status()));
            }
            Err(_) => {
                lines.push("  readyz: NOT REACHABLE".to_string());
            }
        }

        // 4. Node summary as seen by the daemon
        if let Ok(nodes) = ctx.client.list_nodes(None).await {
            if let Some(nodes) = nodes["nodes"].as_array() {
                lines.push(String::new());
                lines.push(format!("Nodes ({}):", nodes.len()));
                for node in nodes {
                    lines.push(format!(
                        "  {:<20} {}",
                        node["id"].as_str().unwrap_or("?"),
                        node["status"].as_str().unwrap_or("unknown")
                    ));
                }
            }
        }

        Ok(lines.join("\n"))
    }
}
