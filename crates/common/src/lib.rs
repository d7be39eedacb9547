/**
 * Credential cryptography.
 *  - Encryption key handling
 *  - Envelope encryption of node private keys
 */
pub mod crypto;
/**
 * Events fanned out to live dashboard viewers.
 */
pub mod event;
/**
 * The node record as seen by the dashboard core,
 *  plus its connectivity state machine.
 */
pub mod node;
/**
 * Helper for reporting build version information.
 */
pub mod version;

pub mod prelude {
    pub use crate::crypto::{CipherError, EncryptionKey};
    pub use crate::event::FleetEvent;
    pub use crate::node::{ConnectivityState, NodeRecord, NodeSummary};
    pub use crate::version::build_info;
}
