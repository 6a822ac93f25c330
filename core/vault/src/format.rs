//! Chooses a store format from the file contents.

use std::path::Path;
use tracing::Span;

use crate::kdbx::{has_kdbx_signature, KdbxOpener};
use crate::store::{CredentialStore, StoreOpener};
use crate::vault::VaultOpener;
use kdfs_common::Result;

/// Opens KDBX databases and kdfs containers alike.
///
/// Files starting with the KDBX signature go to [`KdbxOpener`]; everything
/// else is treated as a kdfs container.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatOpener;

impl StoreOpener for FormatOpener {
    fn open(&self, path: &Path, secret: &[u8], span: Span) -> Result<Box<dyn CredentialStore>> {
        if has_kdbx_signature(path)? {
            KdbxOpener.open(path, secret, span)
        } else {
            VaultOpener.open(path, secret, span)
        }
    }
}
