//! Argon2id key derivation.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::keys::{MasterKey, Salt, KEY_LENGTH};
use kdfs_common::{Error, Result};

/// Largest memory cost accepted from a container header, in KiB (4 GiB).
pub const MAX_MEMORY_COST: u32 = 4 * 1024 * 1024;

/// Largest iteration count accepted from a container header.
pub const MAX_TIME_COST: u32 = 64;

/// Argon2id cost parameters, stored in the container header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Costs for a vault unlocked interactively; around half a second on a
    /// desktop machine.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 64 * 1024,
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Minimal costs. Only for tests; offers no brute-force resistance.
    pub fn testing() -> Self {
        Self {
            memory_cost: 64,
            time_cost: 1,
            parallelism: 1,
        }
    }

    /// Reject costs a container header should never carry.
    ///
    /// Headers are read before any authentication, so a hostile file could
    /// otherwise make derivation allocate without bound.
    pub fn check(&self) -> Result<()> {
        if self.memory_cost > MAX_MEMORY_COST || self.time_cost > MAX_TIME_COST {
            return Err(Error::InvalidInput(format!(
                "KDF costs out of range: m={} KiB t={}",
                self.memory_cost, self.time_cost
            )));
        }
        self.argon2().map(|_| ())
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(KEY_LENGTH),
        )
        .map_err(|e| Error::InvalidInput(format!("Invalid KDF parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Derive the master key for `secret`.
///
/// # Errors
/// - [`Error::InvalidInput`] for an empty secret or out-of-range costs
/// - [`Error::Crypto`] if Argon2 itself fails
pub fn derive_key(secret: &[u8], salt: &Salt, params: &KdfParams) -> Result<MasterKey> {
    if secret.is_empty() {
        return Err(Error::InvalidInput("Secret cannot be empty".to_string()));
    }
    params.check()?;

    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
    params
        .argon2()?
        .hash_password_into(secret, salt.as_bytes(), &mut key[..])
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(MasterKey::from_bytes(*key))
}
