//! On-disk vault container.
//!
//! A container is a JSON document holding a clear header (format version,
//! KDF salt and parameters, key-verification blob) and an encrypted payload
//! with the serialized group hierarchy.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::model::{Entry, Group, Times};
use kdfs_common::{Error, Result};
use kdfs_crypto::{derive_key, open, seal, KdfParams, MasterKey, Purpose, Salt};

/// Magic string identifying a vault container.
pub const CONTAINER_MAGIC: &str = "kdfs-vault";

const KEY_VERIFICATION: &[u8] = b"KDFS_KEY_VERIFICATION_V1";

/// Container format version for migration support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

impl FormatVersion {
    /// Current container format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version can be read by this build.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

mod b64 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &[u8],
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Clear header of a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub magic: String,
    pub version: FormatVersion,
    /// Salt for master key derivation.
    pub salt: Salt,
    pub kdf_params: KdfParams,
    /// Known constant encrypted under the master key.
    #[serde(with = "b64")]
    pub key_verification: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl ContainerHeader {
    /// Create a header for a new container and return the derived master key.
    ///
    /// # Errors
    /// - Secret empty
    /// - KDF failure
    pub fn new(secret: &[u8], kdf_params: KdfParams) -> Result<(Self, MasterKey)> {
        let salt = Salt::generate();
        let master_key = derive_key(secret, &salt, &kdf_params)?;
        let key_verification = seal(&master_key, Purpose::KeyCheck, KEY_VERIFICATION)?;

        let header = Self {
            magic: CONTAINER_MAGIC.to_string(),
            version: FormatVersion::CURRENT,
            salt,
            kdf_params,
            key_verification,
            created_at: Utc::now(),
        };
        Ok((header, master_key))
    }

    /// Derive the master key for `secret` from this header's parameters.
    pub fn derive(&self, secret: &[u8]) -> Result<MasterKey> {
        derive_key(secret, &self.salt, &self.kdf_params)
    }

    /// Check that `key` is the key this container was created with.
    ///
    /// # Errors
    /// - [`Error::Credential`] if the key does not match
    pub fn verify(&self, key: &MasterKey) -> Result<()> {
        let plaintext = open(key, Purpose::KeyCheck, &self.key_verification)
            .map_err(|_| Error::Credential("key verification failed".to_string()))?;

        if bool::from(plaintext.as_slice().ct_eq(KEY_VERIFICATION)) {
            Ok(())
        } else {
            Err(Error::Credential("key verification failed".to_string()))
        }
    }

    fn check(&self) -> Result<()> {
        if self.magic != CONTAINER_MAGIC {
            return Err(Error::Decryption("not a vault container".to_string()));
        }
        if !self.version.is_compatible() {
            return Err(Error::Decryption(format!(
                "unsupported container version {}.{}",
                self.version.major, self.version.minor
            )));
        }
        self.kdf_params
            .check()
            .map_err(|e| Error::Decryption(format!("bad key derivation header: {}", e)))
    }
}

#[derive(Serialize, Deserialize)]
struct ContainerFile {
    header: ContainerHeader,
    #[serde(with = "b64")]
    payload: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct WireField {
    key: String,
    value: String,
    #[serde(default)]
    protected: bool,
}

#[derive(Serialize, Deserialize)]
struct WireEntry {
    title: String,
    times: Times,
    #[serde(default)]
    fields: Vec<WireField>,
}

#[derive(Serialize, Deserialize)]
struct WireGroup {
    name: String,
    times: Times,
    #[serde(default)]
    groups: Vec<WireGroup>,
    #[serde(default)]
    entries: Vec<WireEntry>,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    root: Vec<WireGroup>,
}

impl WireGroup {
    fn from_group(group: &Group) -> Result<Self> {
        Ok(Self {
            name: group.name.clone(),
            times: group.times,
            groups: group
                .groups
                .iter()
                .map(WireGroup::from_group)
                .collect::<Result<_>>()?,
            entries: group
                .entries
                .iter()
                .map(WireEntry::from_entry)
                .collect::<Result<_>>()?,
        })
    }

    fn into_group(self) -> Group {
        Group {
            name: self.name,
            times: self.times,
            groups: self.groups.into_iter().map(WireGroup::into_group).collect(),
            entries: self.entries.into_iter().map(WireEntry::into_entry).collect(),
        }
    }
}

impl WireEntry {
    fn from_entry(entry: &Entry) -> Result<Self> {
        let fields = entry
            .fields()
            .iter()
            .map(|field| {
                let value = field.value().ok_or_else(|| {
                    Error::NotPermitted(format!("field '{}' is sealed", field.key()))
                })?;
                Ok(WireField {
                    key: field.key().to_string(),
                    value: value.to_string(),
                    protected: field.is_protected(),
                })
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            title: entry.title.clone(),
            times: entry.times,
            fields,
        })
    }

    fn into_entry(self) -> Entry {
        let mut entry = Entry::new(self.title).with_times(self.times);
        for field in self.fields {
            entry.set(field.key, field.value, field.protected);
        }
        entry
    }
}

/// Encrypt the group hierarchy into a container payload.
///
/// # Errors
/// - [`Error::NotPermitted`] if any protected field is still sealed
pub fn seal_payload(key: &MasterKey, groups: &[Group]) -> Result<Vec<u8>> {
    let payload = Payload {
        root: groups.iter().map(WireGroup::from_group).collect::<Result<_>>()?,
    };
    let plaintext = Zeroizing::new(
        serde_json::to_vec(&payload).map_err(|e| Error::Serialization(e.to_string()))?,
    );
    seal(key, Purpose::Payload, &plaintext)
}

/// Decrypt a container payload into the group hierarchy.
///
/// # Errors
/// - [`Error::Decryption`] if the payload fails authentication or is malformed
pub fn open_payload(key: &MasterKey, payload: &[u8]) -> Result<Vec<Group>> {
    let plaintext = open(key, Purpose::Payload, payload)
        .map_err(|_| Error::Decryption("payload authentication failed".to_string()))?;
    let payload: Payload = serde_json::from_slice(&plaintext)
        .map_err(|e| Error::Decryption(format!("malformed payload: {}", e)))?;

    Ok(payload.root.into_iter().map(WireGroup::into_group).collect())
}

/// Read a container from disk, returning its header and encrypted payload.
///
/// # Errors
/// - [`Error::Io`] if the file cannot be read
/// - [`Error::Decryption`] if the file is not a readable container
pub fn read_container(path: &Path) -> Result<(ContainerHeader, Vec<u8>)> {
    let bytes = fs::read(path)?;
    let file: ContainerFile = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Decryption(format!("malformed container: {}", e)))?;
    file.header.check()?;
    Ok((file.header, file.payload))
}

/// Write a container to disk, replacing any existing file.
pub fn write_container(path: &Path, header: &ContainerHeader, payload: Vec<u8>) -> Result<()> {
    let file = ContainerFile {
        header: header.clone(),
        payload,
    };
    let json =
        serde_json::to_vec_pretty(&file).map_err(|e| Error::Serialization(e.to_string()))?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Helpers for producing vault files.
pub struct VaultFile;

impl VaultFile {
    /// Create a new container at `path` holding `groups`, sealed with `secret`.
    ///
    /// # Errors
    /// - Secret empty
    /// - KDF or encryption failure
    /// - I/O failure
    pub fn create(path: &Path, secret: &[u8], groups: &[Group], params: KdfParams) -> Result<()> {
        let (header, master_key) = ContainerHeader::new(secret, params)?;
        let payload = seal_payload(&master_key, groups)?;
        write_container(path, &header, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Vec<Group> {
        vec![Group::new("Passwords").with_entry(
            Entry::new("Bank")
                .with_field("UserName", "alice")
                .with_field("Password", "secret123"),
        )]
    }

    #[test]
    fn test_format_version_compatibility() {
        assert!(FormatVersion::CURRENT.is_compatible());
        assert!(!FormatVersion { major: 2, minor: 0 }.is_compatible());
    }

    #[test]
    fn test_header_verifies_own_key() {
        let (header, key) = ContainerHeader::new(b"pw", KdfParams::testing()).unwrap();
        assert!(header.verify(&key).is_ok());

        let other = header.derive(b"other").unwrap();
        assert!(matches!(header.verify(&other), Err(Error::Credential(_))));
    }

    #[test]
    fn test_create_and_read_container() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.kdfs");
        VaultFile::create(&path, b"pw", &sample(), KdfParams::testing()).unwrap();

        let (header, payload) = read_container(&path).unwrap();
        let key = header.derive(b"pw").unwrap();
        let groups = open_payload(&key, &payload).unwrap();

        assert_eq!(groups[0].name, "Passwords");
        assert_eq!(groups[0].entries[0].get("Password"), Some("secret123"));
        assert!(groups[0].entries[0].fields()[1].is_protected());
    }

    #[test]
    fn test_payload_not_stored_in_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.kdfs");
        VaultFile::create(&path, b"pw", &sample(), KdfParams::testing()).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains(CONTAINER_MAGIC));
        assert!(!raw.contains("secret123"));
        assert!(!raw.contains("Bank"));
    }

    #[test]
    fn test_tampered_payload_is_decryption_error() {
        let (_, key) = ContainerHeader::new(b"pw", KdfParams::testing()).unwrap();
        let mut payload = seal_payload(&key, &sample()).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;

        assert!(matches!(
            open_payload(&key, &payload),
            Err(Error::Decryption(_))
        ));
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = read_container(&dir.path().join("absent.kdfs"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_read_garbage_is_decryption_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.kdfs");
        fs::write(&path, b"definitely not a vault").unwrap();

        assert!(matches!(read_container(&path), Err(Error::Decryption(_))));
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.kdfs");
        let (mut header, key) = ContainerHeader::new(b"pw", KdfParams::testing()).unwrap();
        header.magic = "something-else".to_string();
        write_container(&path, &header, seal_payload(&key, &[]).unwrap()).unwrap();

        assert!(matches!(read_container(&path), Err(Error::Decryption(_))));
    }

    #[test]
    fn test_hostile_kdf_costs_rejected_before_derivation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hostile.kdfs");
        let (mut header, key) = ContainerHeader::new(b"pw", KdfParams::testing()).unwrap();
        header.kdf_params.memory_cost = u32::MAX;
        write_container(&path, &header, seal_payload(&key, &[]).unwrap()).unwrap();

        assert!(matches!(read_container(&path), Err(Error::Decryption(_))));
    }

    #[test]
    fn test_key_check_blob_is_not_a_payload() {
        let (header, key) = ContainerHeader::new(b"pw", KdfParams::testing()).unwrap();
        assert!(open_payload(&key, &header.key_verification).is_err());
    }
}
