pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "fleet")]
#[command(about = "Connectivity core for a fleet of managed VPN nodes")]
pub struct Args {
    /// Daemon API URL (defaults to the port in config.toml)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the fleet config directory (defaults to ~/.fleet)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
