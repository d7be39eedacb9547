//! Cryptographic primitives for the fleet dashboard
//!
//! Node client private keys are long-lived credentials. They are stored
//! encrypted at rest with a single dashboard-wide key and only decrypted for
//! the duration of one outbound node call.
//!
//! - **Key**: 256-bit, supplied as 64 hex characters
//! - **Cipher**: AES-256-GCM with a random 96-bit nonce per encryption
//! - **Envelope**: `base64(nonce || ciphertext || tag)`

mod cipher;

pub use cipher::{
    decrypt, encrypt, CipherError, EncryptionKey, KEY_HEX_LEN, KEY_SIZE, NONCE_SIZE,
};
