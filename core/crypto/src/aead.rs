//! XChaCha20-Poly1305 sealing with purpose binding.
//!
//! Sealed blobs are laid out as `nonce || ciphertext || tag`. Each blob is
//! bound to a [`Purpose`] through associated data, so a blob sealed for one
//! role never opens in another.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng, Payload},
    XChaCha20Poly1305,
};
use zeroize::Zeroizing;

use crate::keys::SymmetricKey;
use kdfs_common::{Error, Result};

pub const NONCE_SIZE: usize = 24;
pub const TAG_SIZE: usize = 16;

/// What a sealed blob protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Known plaintext proving the master key.
    KeyCheck,
    /// Serialized group hierarchy of a container.
    Payload,
    /// One protected field held in memory.
    Field,
}

impl Purpose {
    fn associated_data(self) -> &'static [u8] {
        match self {
            Purpose::KeyCheck => b"kdfs/key-check/v1",
            Purpose::Payload => b"kdfs/payload/v1",
            Purpose::Field => b"kdfs/field/v1",
        }
    }
}

fn cipher<K: SymmetricKey>(key: &K) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(GenericArray::from_slice(key.key_bytes()))
}

/// Seal `plaintext` for `purpose` under a fresh random nonce.
pub fn seal<K: SymmetricKey>(key: &K, purpose: Purpose, plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let payload = Payload {
        msg: plaintext,
        aad: purpose.associated_data(),
    };
    let ciphertext = cipher(key)
        .encrypt(&nonce, payload)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a blob produced by [`seal`] with the same key and purpose.
///
/// # Errors
/// - [`Error::Crypto`] if the blob is truncated or fails authentication.
///   Callers decide whether that means a wrong key or damaged data.
pub fn open<K: SymmetricKey>(
    key: &K,
    purpose: Purpose,
    sealed: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::Crypto(format!(
            "Sealed data too short: {} bytes",
            sealed.len()
        )));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let payload = Payload {
        msg: ciphertext,
        aad: purpose.associated_data(),
    };
    cipher(key)
        .decrypt(GenericArray::from_slice(nonce), payload)
        .map(Zeroizing::new)
        .map_err(|_| Error::Crypto("Authentication failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::MemoryKey;

    #[test]
    fn test_open_recovers_plaintext() {
        let key = MemoryKey::generate();
        let sealed = seal(&key, Purpose::Field, b"secret123").unwrap();

        assert_eq!(sealed.len(), NONCE_SIZE + b"secret123".len() + TAG_SIZE);
        assert_eq!(open(&key, Purpose::Field, &sealed).unwrap().as_slice(), b"secret123");
    }

    #[test]
    fn test_nonce_is_fresh() {
        let key = MemoryKey::generate();
        let a = seal(&key, Purpose::Field, b"same").unwrap();
        let b = seal(&key, Purpose::Field, b"same").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }

    #[test]
    fn test_purpose_mismatch_fails() {
        let key = MemoryKey::generate();
        let sealed = seal(&key, Purpose::KeyCheck, b"check").unwrap();

        assert!(open(&key, Purpose::Payload, &sealed).is_err());
        assert!(open(&key, Purpose::Field, &sealed).is_err());
        assert!(open(&key, Purpose::KeyCheck, &sealed).is_ok());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&MemoryKey::generate(), Purpose::Payload, b"data").unwrap();
        let err = open(&MemoryKey::generate(), Purpose::Payload, &sealed).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_tampering_detected() {
        let key = MemoryKey::generate();
        let mut sealed = seal(&key, Purpose::Payload, b"important").unwrap();
        sealed[NONCE_SIZE + 2] ^= 0x01;
        assert!(open(&key, Purpose::Payload, &sealed).is_err());
    }

    #[test]
    fn test_truncated_input_rejected() {
        let key = MemoryKey::generate();
        assert!(open(&key, Purpose::Payload, &[0u8; NONCE_SIZE + TAG_SIZE - 1]).is_err());
        assert!(open(&key, Purpose::Payload, &[]).is_err());
    }
}
