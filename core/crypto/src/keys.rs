//! Key material. Every key type zeroizes itself on drop and redacts its
//! `Debug` output.

use chacha20poly1305::aead::{rand_core::RngCore, OsRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of symmetric keys in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of the key-derivation salt in bytes.
pub const SALT_LENGTH: usize = 32;

/// A 256-bit key usable with [`crate::aead`].
pub trait SymmetricKey {
    fn key_bytes(&self) -> &[u8; KEY_LENGTH];
}

macro_rules! symmetric_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Zeroize, ZeroizeOnDrop)]
        pub struct $name([u8; KEY_LENGTH]);

        impl SymmetricKey for $name {
            fn key_bytes(&self) -> &[u8; KEY_LENGTH] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "([REDACTED])"))
            }
        }
    };
}

symmetric_key!(
    /// Key derived from the vault secret. Encrypts the container payload and
    /// its key-check blob.
    MasterKey
);

symmetric_key!(
    /// Per-process key sealing protected fields while a store is locked.
    /// Never persisted.
    MemoryKey
);

impl MasterKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl MemoryKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }
}

/// Argon2id salt, stored in the clear in the container header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt([u8; SALT_LENGTH]);

impl Salt {
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        Self(salt)
    }

    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}
