//! File-backed credential store.
//!
//! A [`Vault`] holds the derived master key from the moment it is opened.
//! Unlocking verifies that key and decrypts the payload; locking seals the
//! protected fields under an ephemeral memory key.

use std::path::{Path, PathBuf};
use tracing::{debug, warn, Span};

use crate::container::{
    open_payload, read_container, seal_payload, write_container, ContainerHeader,
};
use crate::model::{seal_protected, unseal_protected, Group};
use crate::store::{CredentialStore, StoreOpener};
use kdfs_common::{Error, Result};
use kdfs_crypto::{MasterKey, MemoryKey};

/// State of an opened vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// Payload still encrypted; the secret has not been verified.
    Sealed,
    /// Hierarchy decrypted, protected fields in the clear.
    Unlocked,
    /// Hierarchy decrypted, protected fields sealed in memory.
    Locked,
}

/// A vault container opened with a secret.
pub struct Vault {
    path: PathBuf,
    header: ContainerHeader,
    master_key: MasterKey,
    memory_key: MemoryKey,
    payload: Vec<u8>,
    groups: Vec<Group>,
    state: VaultState,
    span: Span,
}

impl Vault {
    /// Read the container at `path` and derive its key from `secret`.
    ///
    /// The secret is not verified until [`CredentialStore::unlock`].
    ///
    /// # Errors
    /// - File unreadable
    /// - Not a container, or unsupported format version
    /// - Secret empty
    pub fn open(path: &Path, secret: &[u8], span: Span) -> Result<Self> {
        let (header, payload) = read_container(path)?;
        let master_key = header.derive(secret)?;
        debug!(parent: &span, path = %path.display(), "Vault container opened");

        Ok(Self {
            path: path.to_path_buf(),
            header,
            master_key,
            memory_key: MemoryKey::generate(),
            payload,
            groups: Vec::new(),
            state: VaultState::Sealed,
            span,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    /// Mutable access to the hierarchy while unlocked.
    ///
    /// # Errors
    /// - Vault is not unlocked
    pub fn groups_mut(&mut self) -> Result<&mut Vec<Group>> {
        match self.state {
            VaultState::Unlocked => Ok(&mut self.groups),
            _ => Err(Error::NotPermitted("Vault is locked".to_string())),
        }
    }

    /// Re-encrypt the hierarchy and write it back to the container file.
    ///
    /// # Errors
    /// - Vault is not unlocked
    /// - Encryption or I/O failure
    pub fn save(&self) -> Result<()> {
        if self.state != VaultState::Unlocked {
            return Err(Error::NotPermitted("Vault is locked".to_string()));
        }
        let payload = seal_payload(&self.master_key, &self.groups)?;
        write_container(&self.path, &self.header, payload)?;
        debug!(parent: &self.span, path = %self.path.display(), "Vault saved");
        Ok(())
    }
}

impl CredentialStore for Vault {
    fn unlock(&mut self) -> Result<()> {
        match self.state {
            VaultState::Unlocked => Ok(()),
            VaultState::Locked => {
                unseal_protected(&mut self.groups, &self.memory_key)?;
                self.state = VaultState::Unlocked;
                Ok(())
            }
            VaultState::Sealed => {
                self.header.verify(&self.master_key)?;
                self.groups = open_payload(&self.master_key, &self.payload)?;
                self.payload = Vec::new();
                self.state = VaultState::Unlocked;
                debug!(parent: &self.span, groups = self.groups.len(), "Vault unlocked");
                Ok(())
            }
        }
    }

    fn lock(&mut self) {
        if self.state != VaultState::Unlocked {
            return;
        }
        if let Err(e) = seal_protected(&mut self.groups, &self.memory_key) {
            warn!(parent: &self.span, "Failed to seal protected fields: {}", e);
        }
        self.state = VaultState::Locked;
    }

    fn root(&self) -> &[Group] {
        &self.groups
    }

    fn is_locked(&self) -> bool {
        self.state != VaultState::Unlocked
    }
}

impl Drop for Vault {
    fn drop(&mut self) {
        self.lock();
    }
}

/// Opens [`Vault`] containers from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct VaultOpener;

impl StoreOpener for VaultOpener {
    fn open(&self, path: &Path, secret: &[u8], span: Span) -> Result<Box<dyn CredentialStore>> {
        Ok(Box::new(Vault::open(path, secret, span)?))
    }
}
