// HTTP client for a running daemon
pub mod client;

// App state (configuration, paths)
pub mod state;

// Re-exports for consumers
pub use service::process::{spawn_service, start_service, ShutdownHandle};
pub use service::ServiceConfig;
pub use state::{AppConfig, AppState, StateError};
