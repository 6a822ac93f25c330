//! Credential vault for kdfs.
//!
//! This module provides:
//! - The group/entry model exposed by credential stores
//! - The encrypted on-disk container format
//! - A reader for KeePass KDBX databases
//! - A file-backed store with lock/unlock of protected fields
//! - An in-memory store
//!
//! # Architecture
//! Consumers depend only on [`CredentialStore`] and [`StoreOpener`]; the
//! projection never sees keys or the container layout.

pub mod container;
pub mod format;
pub mod kdbx;
pub mod memory;
pub mod model;
pub mod store;
pub mod vault;

pub use container::{ContainerHeader, FormatVersion, VaultFile};
pub use format::FormatOpener;
pub use kdbx::KdbxOpener;
pub use memory::MemoryStore;
pub use model::{AttributeKey, Entry, Field, Group, Times};
pub use store::{CredentialStore, StoreOpener};
pub use vault::{Vault, VaultOpener, VaultState};
