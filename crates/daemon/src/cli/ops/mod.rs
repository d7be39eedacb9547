pub mod daemon;
pub mod encrypt;
pub mod health;
pub mod init;
pub mod poll;
pub mod probe;
pub mod version;

pub use daemon::Daemon;
pub use encrypt::Encrypt;
pub use health::Health;
pub use init::Init;
pub use poll::Poll;
pub use probe::Probe;
pub use version::Version;
