//! Cryptographic primitives for kdfs vault containers.
//!
//! - Argon2id derivation of the master key from the vault secret
//! - XChaCha20-Poly1305 sealing, bound to the role of each blob
//!
//! Key material zeroizes on drop and is never logged.

pub mod aead;
pub mod kdf;
pub mod keys;

pub use aead::{open, seal, Purpose};
pub use kdf::{derive_key, KdfParams};
pub use keys::{MasterKey, MemoryKey, Salt, SymmetricKey};
