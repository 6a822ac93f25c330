//! KeePass KDBX databases.
//!
//! The database is decrypted and checked against the secret while opening.
//! Its hierarchy is then copied into the crate's model and handed out as a
//! [`MemoryStore`], with protected values sealed until unlock. Nothing of the
//! parsed database outlives [`KdbxOpener::open`].

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use keepass::db::{Entry as KdbxEntry, Group as KdbxGroup, Node, Times as KdbxTimes, Value};
use keepass::error::{DatabaseKeyError, DatabaseOpenError};
use keepass::{Database, DatabaseKey};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use tracing::{debug, Span};

use crate::memory::MemoryStore;
use crate::model::{Entry, Group, Times};
use crate::store::{CredentialStore, StoreOpener};
use kdfs_common::{Error, Result};

/// Leading bytes of every KDBX file: the two little-endian signature words.
pub const KDBX_SIGNATURE: [u8; 8] = [0x03, 0xD9, 0xA2, 0x9A, 0x67, 0xFB, 0x4B, 0xB5];

const TITLE: &str = "Title";

/// Whether the file at `path` starts with the KDBX signature.
///
/// # Errors
/// - [`Error::Io`] if the file cannot be read
pub fn has_kdbx_signature(path: &Path) -> Result<bool> {
    let mut prefix = [0u8; KDBX_SIGNATURE.len()];
    match File::open(path)?.read_exact(&mut prefix) {
        Ok(()) => Ok(prefix == KDBX_SIGNATURE),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn open_error(error: DatabaseOpenError) -> Error {
    match error {
        DatabaseOpenError::Key(DatabaseKeyError::IncorrectKey) => {
            Error::Credential("database key rejected".to_string())
        }
        other => Error::Decryption(format!("Unreadable KDBX database: {}", other)),
    }
}

fn utc(time: Option<&NaiveDateTime>) -> Option<DateTime<Utc>> {
    time.map(|t| Utc.from_utc_datetime(t))
}

fn convert_times(times: &KdbxTimes) -> Times {
    let created = utc(times.get_creation()).unwrap_or_default();
    let modified = utc(times.get_last_modification()).unwrap_or(created);
    let accessed = utc(times.get_last_access()).unwrap_or(modified);
    Times {
        created,
        modified,
        accessed,
    }
}

fn convert_entry(entry: &KdbxEntry, span: &Span) -> Entry {
    let mut converted = Entry::new(String::new()).with_times(convert_times(&entry.times));

    let mut keys: Vec<&String> = entry.fields.keys().collect();
    keys.sort();
    for key in keys {
        match &entry.fields[key] {
            Value::Unprotected(value) => converted.set(key.as_str(), value.as_str(), false),
            Value::Protected(value) => match std::str::from_utf8(value.unsecure()) {
                Ok(value) => converted.set(key.as_str(), value, true),
                Err(_) => debug!(parent: span, key = %key, "Skipping non UTF-8 protected value"),
            },
            _ => {}
        }
    }

    converted.title = converted.get(TITLE).unwrap_or_default().to_string();
    converted
}

fn convert_group(group: &KdbxGroup, span: &Span) -> Group {
    let mut converted = Group::new(group.name.clone()).with_times(convert_times(&group.times));
    for node in &group.children {
        match node {
            Node::Group(child) => converted.groups.push(convert_group(child, span)),
            Node::Entry(entry) => converted.entries.push(convert_entry(entry, span)),
        }
    }
    converted
}

/// Opens KeePass `.kdbx` files protected by a password.
#[derive(Debug, Default, Clone, Copy)]
pub struct KdbxOpener;

impl StoreOpener for KdbxOpener {
    /// The root group of the database becomes the single top-level group.
    ///
    /// # Errors
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::InvalidInput`] if the secret is not UTF-8
    /// - [`Error::Credential`] if the database rejects the secret
    /// - [`Error::Decryption`] for anything that is not a readable database
    fn open(&self, path: &Path, secret: &[u8], span: Span) -> Result<Box<dyn CredentialStore>> {
        let password = std::str::from_utf8(secret)
            .map_err(|_| Error::InvalidInput("Password is not valid UTF-8".to_string()))?;
        let mut reader = BufReader::new(File::open(path)?);
        let key = DatabaseKey::new().with_password(password);
        let database = Database::open(&mut reader, key).map_err(open_error)?;

        let groups = vec![convert_group(&database.root, &span)];
        drop(database);
        debug!(parent: &span, path = %path.display(), "KDBX database opened");

        Ok(Box::new(MemoryStore::new(groups, span)?))
    }
}
