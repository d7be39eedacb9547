use std::io::Read;
use std::path::PathBuf;

use clap::Args;

use fleet_daemon::state::{AppState, StateError};

/// Seal a node's client private key for `nodes.toml`
#[derive(Args, Debug, Clone)]
pub struct Encrypt {
    /// PEM file to encrypt (reads stdin if not set)
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("encryption failed: {0}")]
    Cipher(#[from] common::crypto::CipherError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Encrypt {
    type Error = EncryptError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let key = state.load_key()?;

        let plaintext = match &self.file {
            Some(path) => std::fs::read_to_string(path)?,
            None => {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            }
        };

        Ok(key.encrypt(&plaintext)?)
    }
}
