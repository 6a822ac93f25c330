//! Group/entry hierarchy exposed by a credential store.
//!
//! Attribute values marked as protected are held either in the clear
//! (zeroized on drop) or sealed under the vault's ephemeral [`MemoryKey`]
//! while the store is locked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use kdfs_common::{Error, Result};
use kdfs_crypto::{open, seal, MemoryKey, Purpose};

/// Creation, modification and access timestamps of a group or entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Times {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
}

impl Times {
    /// All three timestamps set to the same instant.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            created: instant,
            modified: instant,
            accessed: instant,
        }
    }

    pub fn now() -> Self {
        Self::at(Utc::now())
    }
}

impl Default for Times {
    fn default() -> Self {
        Self::now()
    }
}

/// The standard entry attributes that are projected as files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKey {
    UserName,
    Password,
    Notes,
    Url,
}

impl AttributeKey {
    /// Projection order of the standard attributes.
    pub const PROJECTED: [AttributeKey; 4] = [
        AttributeKey::UserName,
        AttributeKey::Password,
        AttributeKey::Notes,
        AttributeKey::Url,
    ];

    /// Key under which the attribute is stored in an entry.
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeKey::UserName => "UserName",
            AttributeKey::Password => "Password",
            AttributeKey::Notes => "Notes",
            AttributeKey::Url => "URL",
        }
    }

    /// Name of the file the attribute projects to.
    pub fn file_name(self) -> String {
        self.as_str().to_lowercase()
    }

    /// Whether values for this key are protected by default.
    pub fn protected_by_default(key: &str) -> bool {
        key == AttributeKey::Password.as_str()
    }
}

#[derive(Clone)]
enum FieldValue {
    Clear(Zeroizing<String>),
    Sealed(Vec<u8>),
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Clear(_) => write!(f, "Clear([REDACTED])"),
            FieldValue::Sealed(bytes) => write!(f, "Sealed({} bytes)", bytes.len()),
        }
    }
}

/// One key/value attribute of an entry.
#[derive(Debug, Clone)]
pub struct Field {
    key: String,
    value: FieldValue,
    protected: bool,
}

impl Field {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The clear value, or `None` while the field is sealed.
    pub fn value(&self) -> Option<&str> {
        match &self.value {
            FieldValue::Clear(value) => Some(value.as_str()),
            FieldValue::Sealed(_) => None,
        }
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    fn seal(&mut self, key: &MemoryKey) -> Result<()> {
        if !self.protected {
            return Ok(());
        }
        if let FieldValue::Clear(value) = &self.value {
            let sealed = seal(key, Purpose::Field, value.as_bytes())?;
            self.value = FieldValue::Sealed(sealed);
        }
        Ok(())
    }

    fn unseal(&mut self, key: &MemoryKey) -> Result<()> {
        if let FieldValue::Sealed(sealed) = &self.value {
            let bytes = open(key, Purpose::Field, sealed)?;
            let value = std::str::from_utf8(&bytes).map_err(|_| {
                Error::Decryption(format!("Protected field '{}' is not UTF-8", self.key))
            })?;
            self.value = FieldValue::Clear(Zeroizing::new(value.to_string()));
        }
        Ok(())
    }
}

/// A credential record: a title plus attribute values.
#[derive(Debug, Clone)]
pub struct Entry {
    pub title: String,
    pub times: Times,
    fields: Vec<Field>,
}

impl Entry {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            times: Times::now(),
            fields: Vec::new(),
        }
    }

    /// Builder form of [`Entry::set`] with the default protection for `key`.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let protected = AttributeKey::protected_by_default(&key);
        self.set(key, value, protected);
        self
    }

    pub fn with_times(mut self, times: Times) -> Self {
        self.times = times;
        self
    }

    /// Insert or replace the value stored under `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>, protected: bool) {
        let key = key.into();
        let field = Field {
            value: FieldValue::Clear(Zeroizing::new(value.into())),
            key,
            protected,
        };
        match self.fields.iter_mut().find(|f| f.key == field.key) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// The clear value stored under `key`, if present and not sealed.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .and_then(Field::value)
    }

    pub fn attribute(&self, key: AttributeKey) -> Option<&str> {
        self.get(key.as_str())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn seal(&mut self, key: &MemoryKey) -> Result<()> {
        self.fields.iter_mut().try_for_each(|f| f.seal(key))
    }

    fn unseal(&mut self, key: &MemoryKey) -> Result<()> {
        self.fields.iter_mut().try_for_each(|f| f.unseal(key))
    }
}

/// A named collection of sub-groups and entries.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub times: Times,
    pub groups: Vec<Group>,
    pub entries: Vec<Entry>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            times: Times::now(),
            groups: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    pub fn with_entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn with_times(mut self, times: Times) -> Self {
        self.times = times;
        self
    }
}

fn try_for_each_entry(
    groups: &mut [Group],
    f: &mut dyn FnMut(&mut Entry) -> Result<()>,
) -> Result<()> {
    for group in groups {
        try_for_each_entry(&mut group.groups, f)?;
        for entry in &mut group.entries {
            f(entry)?;
        }
    }
    Ok(())
}

/// Seal every protected field in the hierarchy under `key`.
pub(crate) fn seal_protected(groups: &mut [Group], key: &MemoryKey) -> Result<()> {
    try_for_each_entry(groups, &mut |entry| entry.seal(key))
}

/// Reveal every sealed field in the hierarchy.
pub(crate) fn unseal_protected(groups: &mut [Group], key: &MemoryKey) -> Result<()> {
    try_for_each_entry(groups, &mut |entry| entry.unseal(key))
}
