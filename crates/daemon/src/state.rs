use std::{fs, path::Path, path::PathBuf};

use common::crypto::EncryptionKey;
use serde::{Deserialize, Serialize};
use service::{NodeClientConfig, PollerConfig, RateLimitConfig};

pub const APP_NAME: &str = "fleet";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_FILE_NAME: &str = "key.hex";
pub const NODES_FILE_NAME: &str = "nodes.toml";
/// Overrides the key file when set
pub const KEY_ENV_VAR: &str = "FLEET_ENCRYPTION_KEY";

const NODES_TEMPLATE: &str = r#"# Nodes managed by this dashboard core.
#
# [[nodes]]
# id = "fra-1"
# organization_id = "acme"
# name = "Frankfurt edge"
# base_url = "https://203.0.113.7:8443"
# client_cert_pem = """-----BEGIN CERTIFICATE-----
# ...
# -----END CERTIFICATE-----"""
# client_key_envelope = "<output of `fleet encrypt`>"
# server_ca_pem = """-----BEGIN CERTIFICATE-----
# ...
# -----END CERTIFICATE-----"""
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the API server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Directory for log files (logs to stdout only if not set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub node_client: NodeClientConfig,
}

fn default_api_port() -> u16 {
    3000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            log_dir: None,
            poller: PollerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            node_client: NodeClientConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the fleet directory (~/.fleet)
    pub fleet_dir: PathBuf,
    /// Path to the hex encryption key
    pub key_path: PathBuf,
    /// Path to the node inventory
    pub nodes_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the fleet directory path (custom or default ~/.fleet)
    pub fn fleet_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new fleet state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let fleet_dir = Self::fleet_dir(custom_path)?;

        if fleet_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&fleet_dir)?;

        // Generate and save key
        let key = EncryptionKey::generate().map_err(|e| StateError::InvalidKey(e.to_string()))?;
        let key_path = fleet_dir.join(KEY_FILE_NAME);
        write_private(&key_path, &key.to_hex())?;

        // Create config (use provided or default)
        let config = config.unwrap_or_default();
        let config_path = fleet_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        let nodes_path = fleet_dir.join(NODES_FILE_NAME);
        fs::write(&nodes_path, NODES_TEMPLATE)?;

        Ok(Self {
            fleet_dir,
            key_path,
            nodes_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the fleet directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let fleet_dir = Self::fleet_dir(custom_path)?;

        if !fleet_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let key_path = fleet_dir.join(KEY_FILE_NAME);
        let nodes_path = fleet_dir.join(NODES_FILE_NAME);
        let config_path = fleet_dir.join(CONFIG_FILE_NAME);

        // the key file may be replaced by the environment
        if !key_path.exists() && std::env::var_os(KEY_ENV_VAR).is_none() {
            return Err(StateError::MissingFile(KEY_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            fleet_dir,
            key_path,
            nodes_path,
            config_path,
            config,
        })
    }

    /// Load the encryption key, preferring the environment over the key file
    pub fn load_key(&self) -> Result<EncryptionKey, StateError> {
        self.resolve_key(std::env::var(KEY_ENV_VAR).ok())
    }

    fn resolve_key(&self, from_env: Option<String>) -> Result<EncryptionKey, StateError> {
        let hex = match from_env {
            Some(value) => {
                tracing::debug!("using encryption key from {}", KEY_ENV_VAR);
                value
            }
            None => fs::read_to_string(&self.key_path)?,
        };
        // tolerate surrounding whitespace from the file or variable
        EncryptionKey::from_hex(hex.trim()).map_err(|e| StateError::InvalidKey(e.to_string()))
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    fs::write(path, contents)
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("fleet directory not initialized. Run 'fleet init' first")]
    NotInitialized,

    #[error("fleet directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("fleet");

        let created = AppState::init(Some(dir.clone()), None).unwrap();
        assert!(created.key_path.exists());
        assert!(created.nodes_path.exists());

        let loaded = AppState::load(Some(dir.clone())).unwrap();
        assert_eq!(loaded.config.api_port, 3000);
        assert_eq!(loaded.config.poller.interval_secs, 30);
        assert_eq!(loaded.config.rate_limit.max_tokens, 100);

        let key = loaded.resolve_key(None).unwrap();
        assert_eq!(key.to_hex(), fs::read_to_string(&loaded.key_path).unwrap());

        assert!(matches!(
            AppState::init(Some(dir), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::init(Some(tmp.path().join("fleet")), None).unwrap();
        let mode = fs::metadata(&state.key_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_environment_key_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::init(Some(tmp.path().join("fleet")), None).unwrap();

        let other = EncryptionKey::generate().unwrap();
        let key = state.resolve_key(Some(other.to_hex())).unwrap();
        assert_eq!(key, other);

        assert!(matches!(
            state.resolve_key(Some("abc".into())),
            Err(StateError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_key_surrounding_whitespace_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::init(Some(tmp.path().join("fleet")), None).unwrap();

        let stored = fs::read_to_string(&state.key_path).unwrap();
        fs::write(&state.key_path, format!("{}\n", stored)).unwrap();
        assert_eq!(state.resolve_key(None).unwrap().to_hex(), stored);

        let other = EncryptionKey::generate().unwrap();
        let key = state.resolve_key(Some(format!("  {}\r\n", other.to_hex()))).unwrap();
        assert_eq!(key, other);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
api_port = 4100

[poller]
interval_secs = 5
"#,
        )
        .unwrap();
        assert_eq!(config.api_port, 4100);
        assert_eq!(config.poller.interval_secs, 5);
        assert_eq!(config.poller.check_timeout_secs, 10);
        assert_eq!(config.rate_limit.window_ms, 60_000);
    }

    #[test]
    fn test_load_uninitialized() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(tmp.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }
}
