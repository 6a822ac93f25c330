//! Credential store abstraction.

use std::path::Path;
use tracing::Span;

use crate::model::Group;
use kdfs_common::Result;

/// An opened credential store.
///
/// The hierarchy returned by [`CredentialStore::root`] is only meaningful
/// after a successful [`CredentialStore::unlock`].
pub trait CredentialStore: Send {
    /// Verify the secret and make the hierarchy readable.
    ///
    /// # Errors
    /// - [`kdfs_common::Error::Credential`] if the secret is wrong
    /// - [`kdfs_common::Error::Decryption`] if the content is damaged
    fn unlock(&mut self) -> Result<()>;

    /// Re-protect sensitive values in memory. Best effort, never fails.
    fn lock(&mut self);

    /// Top-level groups of the hierarchy.
    fn root(&self) -> &[Group];

    fn is_locked(&self) -> bool;
}

/// Opens credential stores from a file and a secret.
pub trait StoreOpener {
    /// Open the store at `path`. The returned store logs under `span`.
    ///
    /// # Errors
    /// - [`kdfs_common::Error::Io`] if the file cannot be read
    /// - [`kdfs_common::Error::Decryption`] if the file is not a store
    /// - [`kdfs_common::Error::Credential`] if the format checks the secret
    ///   while opening and it is wrong
    fn open(&self, path: &Path, secret: &[u8], span: Span) -> Result<Box<dyn CredentialStore>>;
}
