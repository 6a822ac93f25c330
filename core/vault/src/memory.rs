//! In-memory credential store.

use crate::model::{seal_protected, unseal_protected, Group};
use crate::store::CredentialStore;
use kdfs_common::Result;
use kdfs_crypto::MemoryKey;
use tracing::{warn, Span};

/// A credential store over a hierarchy built in memory.
///
/// Starts locked with protected fields sealed; [`CredentialStore::unlock`]
/// always succeeds.
pub struct MemoryStore {
    groups: Vec<Group>,
    memory_key: MemoryKey,
    locked: bool,
    span: Span,
}

impl MemoryStore {
    pub fn new(groups: Vec<Group>, span: Span) -> Result<Self> {
        let memory_key = MemoryKey::generate();
        let mut groups = groups;
        seal_protected(&mut groups, &memory_key)?;
        Ok(Self {
            groups,
            memory_key,
            locked: true,
            span,
        })
    }
}

impl CredentialStore for MemoryStore {
    fn unlock(&mut self) -> Result<()> {
        if self.locked {
            unseal_protected(&mut self.groups, &self.memory_key)?;
            self.locked = false;
        }
        Ok(())
    }

    fn lock(&mut self) {
        if self.locked {
            return;
        }
        if let Err(e) = seal_protected(&mut self.groups, &self.memory_key) {
            warn!(parent: &self.span, "Failed to seal protected fields: {}", e);
        }
        self.locked = true;
    }

    fn root(&self) -> &[Group] {
        &self.groups
    }

    fn is_locked(&self) -> bool {
        self.locked
    }
}
