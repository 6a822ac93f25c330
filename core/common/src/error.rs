//! Common error types for kdfs.

use thiserror::Error;

/// Top-level error type for kdfs operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The vault file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The container is corrupt, truncated or of an unsupported format.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// The supplied secret does not open the container.
    #[error("incorrect credential: {0}")]
    Credential(String),

    /// A cryptographic primitive was misused or failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The projection could not be attached to the mount point.
    #[error("Mount error: {0}")]
    Mount(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not permitted in the current state.
    #[error("Not permitted: {0}")]
    NotPermitted(String),
}

impl Error {
    /// Whether this error means the secret was wrong rather than the data bad.
    pub fn is_credential(&self) -> bool {
        matches!(self, Error::Credential(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
